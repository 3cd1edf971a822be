//! 豆瓣 Top250 页面解析
//! 该榜单只有服务端渲染的 HTML，没有 JSON 接口

use crate::parser::{PayloadParser, ShapeError, ACCEPT_HTML};
use crate::types::{NormalizedItem, UNRATED};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

pub const TOP250_URL: &str = "https://movie.douban.com/top250";

static ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse("div.item").expect("valid selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));
static IMAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img[alt][src]").expect("valid selector"));
static RATING: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.rating_num").expect("valid selector"));

static SUBJECT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://movie\.douban\.com/subject/(\d+)/?").expect("valid regex"));

/// Top250 分页地址
pub fn top250_url(page_start: u32) -> String {
    format!("{}?start={}&filter=", TOP250_URL, page_start)
}

/// 明文图片地址改为 https
pub fn upgrade_to_https(url: &str) -> String {
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Top250Parser;

impl Top250Parser {
    fn extract(block: ElementRef<'_>) -> Option<NormalizedItem> {
        let id = block
            .select(&LINK)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| SUBJECT_ID.captures(href))
            .map(|caps| caps[1].to_string())?;

        let image = block.select(&IMAGE).next()?;
        let title = image.value().attr("alt")?.trim();
        let src = image.value().attr("src")?.trim();
        if title.is_empty() || src.is_empty() {
            return None;
        }

        let rate = block
            .select(&RATING)
            .next()
            .map(|span| span.text().collect::<String>().trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| UNRATED.to_string());

        Some(NormalizedItem {
            id,
            title: title.to_string(),
            poster: upgrade_to_https(src),
            rate,
        })
    }
}

impl PayloadParser for Top250Parser {
    type Output = Vec<NormalizedItem>;

    fn accept(&self) -> &'static str {
        ACCEPT_HTML
    }

    fn parse(&self, body: &str) -> Result<Self::Output, ShapeError> {
        let document = Html::parse_document(body);
        let blocks: Vec<_> = document.select(&ITEM).collect();
        if blocks.is_empty() {
            return Err(ShapeError::NoEntries);
        }

        let total = blocks.len();
        let items: Vec<_> = blocks.into_iter().filter_map(Self::extract).collect();
        if items.len() < total {
            debug!("Top250 跳过 {} 个无法识别的条目", total - items.len());
        }

        Ok(items)
    }
}
