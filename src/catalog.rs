//! 豆瓣目录服务
//! 参数校验、标签映射、Top250 分流以及失败时的软降级

use crate::error::ApiError;
use crate::parser::{RawJsonParser, SubjectsParser, TagsParser};
use crate::resolver::{ResolveError, Resolved, Resolver};
use crate::scrape::{top250_url, Top250Parser};
use crate::types::{
    MediaType, NormalizedItem, NormalizedResult, SoftFailureDebug, Sort, TagCategory, TOP250_TAG,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

const SUBJECTS_URL: &str = "https://movie.douban.com/j/search_subjects";
const TAGS_URL: &str = "https://movie.douban.com/j/search_tags";

/// 允许中转的上游域名
const ALLOWED_HOST: &str = "douban.com";

const DEFAULT_PAGE_SIZE: u32 = 16;
const MAX_PAGE_SIZE: u32 = 100;

/// 列表接口的原始查询参数
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingQuery {
    #[serde(rename = "type")]
    pub media: Option<String>,
    pub tag: Option<String>,
    pub sort: Option<String>,
    pub page_size: Option<String>,
    pub page_start: Option<String>,
    pub title: Option<String>,
}

/// 校验后的列表请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRequest {
    pub media: MediaType,
    pub tag: String,
    pub sort: Sort,
    pub page_size: u32,
    pub page_start: u32,
    pub title: Option<String>,
}

impl TryFrom<ListingQuery> for ListingRequest {
    type Error = ApiError;

    fn try_from(query: ListingQuery) -> Result<Self, Self::Error> {
        let media = query.media.filter(|s| !s.is_empty());
        let tag = query.tag.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        let (media, tag) = match (media, tag) {
            (Some(media), Some(tag)) => (media, tag),
            _ => return Err(ApiError::InvalidRequest("缺少必要参数: type 或 tag".to_string())),
        };
        let media: MediaType = media.parse().map_err(ApiError::InvalidRequest)?;

        let sort = match query.sort.as_deref().filter(|s| !s.is_empty()) {
            Some(sort) => sort.parse().map_err(ApiError::InvalidRequest)?,
            None => Sort::default(),
        };

        let page_size = match query.page_size.as_deref() {
            Some(raw) => u32::try_from(parse_int("pageSize", raw)?)
                .ok()
                .filter(|n| (1..=MAX_PAGE_SIZE).contains(n))
                .ok_or_else(|| {
                    ApiError::InvalidRequest(format!("pageSize 必须在 1-{} 之间", MAX_PAGE_SIZE))
                })?,
            None => DEFAULT_PAGE_SIZE,
        };

        let page_start = match query.page_start.as_deref() {
            Some(raw) => match parse_int("pageStart", raw)? {
                n if n < 0 => {
                    return Err(ApiError::InvalidRequest("pageStart 不能小于 0".to_string()))
                }
                n => u32::try_from(n)
                    .map_err(|_| ApiError::InvalidRequest("pageStart 超出范围".to_string()))?,
            },
            None => 0,
        };

        Ok(Self {
            media,
            tag,
            sort,
            page_size,
            page_start,
            title: query.title.filter(|t| !t.is_empty()),
        })
    }
}

fn parse_int(name: &str, raw: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ApiError::InvalidRequest(format!("{} 必须是整数: {}", name, raw)))
}

/// 把前端标签映射为豆瓣接口支持的标签，未知标签原样透传
pub fn map_tag(tag: &str) -> &str {
    match tag {
        "日漫" => "日本动画",
        other => other,
    }
}

pub fn subjects_url(
    media: MediaType,
    tag: &str,
    sort: Sort,
    page_size: u32,
    page_start: u32,
) -> String {
    format!(
        "{}?type={}&tag={}&sort={}&page_limit={}&page_start={}",
        SUBJECTS_URL,
        media,
        urlencoding::encode(tag),
        sort.as_str(),
        page_size,
        page_start
    )
}

/// 列表查询结果
#[derive(Debug, Clone)]
pub struct Listing {
    pub result: NormalizedResult,
    pub original_tag: String,
    pub final_tag: String,
    /// 成功时胜出的策略
    pub strategy: Option<&'static str>,
}

/// 标签词表来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagSource {
    Douban,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct TagVocabulary {
    pub category: TagCategory,
    pub tags: Vec<String>,
    pub source: TagSource,
}

pub struct Catalog {
    listing: Resolver,
    relay: Resolver,
    scrape: Resolver,
}

impl Catalog {
    /// `listing` 用于列表接口，`relay` 用于标签与通用中转，`scrape` 用于 Top250
    pub fn new(listing: Resolver, relay: Resolver, scrape: Resolver) -> Self {
        Self {
            listing,
            relay,
            scrape,
        }
    }

    pub fn resolvers(&self) -> [(&'static str, &Resolver); 3] {
        [
            ("listing", &self.listing),
            ("relay", &self.relay),
            ("scrape", &self.scrape),
        ]
    }

    pub async fn list(&self, req: &ListingRequest) -> Listing {
        if req.tag == TOP250_TAG {
            return self.top250(req).await;
        }

        let final_tag = map_tag(&req.tag).to_string();
        let url = subjects_url(req.media, &final_tag, req.sort, req.page_size, req.page_start);
        let outcome = self.listing.resolve(&url, &SubjectsParser).await;
        self.finish(req, final_tag, url, outcome)
    }

    async fn top250(&self, req: &ListingRequest) -> Listing {
        let url = top250_url(req.page_start);
        let outcome = self.scrape.resolve(&url, &Top250Parser).await;
        self.finish(req, TOP250_TAG.to_string(), url, outcome)
    }

    fn finish(
        &self,
        req: &ListingRequest,
        final_tag: String,
        url: String,
        outcome: Result<Resolved<Vec<NormalizedItem>>, ResolveError>,
    ) -> Listing {
        match outcome {
            Ok(resolved) => {
                let mut list = resolved.value;
                list.truncate(req.page_size as usize);
                info!(
                    "📋 {} / {}: {} 条 (via {}, 第 {} 次尝试)",
                    req.media,
                    final_tag,
                    list.len(),
                    resolved.strategy,
                    resolved.attempted.len()
                );
                Listing {
                    result: NormalizedResult::success(list),
                    original_tag: req.tag.clone(),
                    final_tag,
                    strategy: Some(resolved.strategy),
                }
            }
            Err(e) => {
                warn!("⚠️ 获取列表失败 {}: {}", url, e);
                let attempted = match &e {
                    ResolveError::AllStrategiesExhausted { attempted, .. } => attempted.clone(),
                    _ => Vec::new(),
                };
                let debug = SoftFailureDebug {
                    url,
                    original_tag: req.tag.clone(),
                    final_tag: final_tag.clone(),
                    title: req.title.clone(),
                    attempted,
                    timestamp: chrono::Utc::now().to_rfc3339(),
                };
                Listing {
                    result: NormalizedResult::soft_failure(e.to_string(), debug),
                    original_tag: req.tag.clone(),
                    final_tag,
                    strategy: None,
                }
            }
        }
    }

    /// 获取分类标签，上游失败时返回内置标签
    pub async fn tags(&self, category: TagCategory) -> TagVocabulary {
        let url = format!("{}?type={}", TAGS_URL, category.douban_type());
        let tags = match self.relay.resolve(&url, &TagsParser).await {
            Ok(resolved) if !resolved.value.is_empty() => Some(resolved.value),
            Ok(_) => {
                warn!("豆瓣标签为空: {}", category.as_str());
                None
            }
            Err(e) => {
                warn!("获取豆瓣标签失败 {}: {}", category.as_str(), e);
                None
            }
        };

        match tags {
            Some(tags) => TagVocabulary {
                category,
                tags,
                source: TagSource::Douban,
            },
            None => TagVocabulary {
                category,
                tags: category.fallback_tags().iter().map(|t| t.to_string()).collect(),
                source: TagSource::Fallback,
            },
        }
    }

    /// 原样中转豆瓣 JSON
    pub async fn relay(&self, target: &Url) -> Result<Resolved<Value>, ApiError> {
        self.relay
            .resolve(target.as_str(), &RawJsonParser)
            .await
            .map_err(|e| {
                warn!("⚠️ 中转失败 {}: {}", target, e);
                match e {
                    ResolveError::AllStrategiesExhausted {
                        last_error,
                        attempted,
                    } => ApiError::RelayExhausted {
                        target_url: target.to_string(),
                        details: last_error,
                        tried: attempted,
                    },
                    other => ApiError::RelayExhausted {
                        target_url: target.to_string(),
                        details: other.to_string(),
                        tried: Vec::new(),
                    },
                }
            })
    }
}

/// 校验中转目标：必须是 http(s) 且域名属于豆瓣
pub fn validate_relay_target(raw: Option<&str>) -> Result<Url, ApiError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("缺少目标 URL 参数".to_string()))?;
    let url = Url::parse(raw).map_err(|_| ApiError::InvalidRequest("无效的 URL 格式".to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::InvalidRequest("无效的 URL 格式".to_string()));
    }

    let allowed = url
        .host_str()
        .map(|host| host == ALLOWED_HOST || host.ends_with(&format!(".{}", ALLOWED_HOST)))
        .unwrap_or(false);
    if !allowed {
        return Err(ApiError::Forbidden("不允许的目标域名".to_string()));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::tests::{allorigins_body, subjects_body, test_chain, FakeFetcher};
    use crate::scrape::tests::fixture;
    use crate::strategy::Direct;
    use std::sync::Arc;
    use std::time::Duration;

    fn catalog(fetcher: Arc<FakeFetcher>) -> Catalog {
        let timeout = Duration::from_secs(1);
        Catalog::new(
            Resolver::new(fetcher.clone(), test_chain(), timeout),
            Resolver::new(fetcher.clone(), test_chain(), timeout),
            Resolver::new(fetcher, vec![Arc::new(Direct)], timeout),
        )
    }

    fn query(pairs: &[(&str, &str)]) -> ListingQuery {
        let mut query = ListingQuery::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "type" => query.media = v,
                "tag" => query.tag = v,
                "sort" => query.sort = v,
                "pageSize" => query.page_size = v,
                "pageStart" => query.page_start = v,
                "title" => query.title = v,
                _ => unreachable!(),
            }
        }
        query
    }

    fn request(pairs: &[(&str, &str)]) -> Result<ListingRequest, ApiError> {
        ListingRequest::try_from(query(pairs))
    }

    #[test]
    fn test_request_validation() {
        let req = request(&[("type", "movie"), ("tag", "热门")]).unwrap();
        assert_eq!(req.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(req.page_start, 0);
        assert_eq!(req.sort, Sort::Recommend);

        for bad in [
            vec![("tag", "热门")],
            vec![("type", "movie")],
            vec![("type", "movie"), ("tag", "  ")],
            vec![("type", "anime"), ("tag", "热门")],
            vec![("type", "tv"), ("tag", "热门"), ("pageSize", "0")],
            vec![("type", "tv"), ("tag", "热门"), ("pageSize", "101")],
            vec![("type", "tv"), ("tag", "热门"), ("pageSize", "abc")],
            vec![("type", "tv"), ("tag", "热门"), ("pageStart", "-1")],
            vec![("type", "tv"), ("tag", "热门"), ("sort", "random")],
        ] {
            assert!(
                matches!(request(&bad), Err(ApiError::InvalidRequest(_))),
                "{:?}",
                bad
            );
        }
    }

    #[test]
    fn test_page_start_errors_are_specific() {
        let message = |raw: &str| {
            match request(&[("type", "tv"), ("tag", "热门"), ("pageStart", raw)]) {
                Err(ApiError::InvalidRequest(message)) => message,
                other => panic!("unexpected: {:?}", other),
            }
        };

        assert!(message("abc").contains("必须是整数"));
        assert!(message("-3").contains("不能小于 0"));
        assert!(message("99999999999").contains("超出范围"));
        assert_eq!(
            request(&[("type", "tv"), ("tag", "热门"), ("pageStart", "40")])
                .unwrap()
                .page_start,
            40
        );
    }

    #[test]
    fn test_tag_mapping_and_url() {
        assert_eq!(map_tag("日漫"), "日本动画");
        assert_eq!(map_tag("美剧"), "美剧");
        assert_eq!(map_tag("赛博朋克"), "赛博朋克");

        let url = subjects_url(MediaType::Tv, "美剧", Sort::Time, 20, 40);
        assert_eq!(
            url,
            "https://movie.douban.com/j/search_subjects?type=tv&tag=%E7%BE%8E%E5%89%A7&sort=time&page_limit=20&page_start=40"
        );
    }

    #[tokio::test]
    async fn test_list_truncates_to_page_size() {
        // 上游忽略 page_limit 时也不能超出
        let fetcher = Arc::new(
            FakeFetcher::default()
                .respond("https://movie.douban.com/j/search_subjects", subjects_body(30)),
        );
        let catalog = catalog(fetcher);

        for size in ["1", "10", "25", "100"] {
            let req = request(&[("type", "movie"), ("tag", "热门"), ("pageSize", size)]).unwrap();
            let listing = catalog.list(&req).await;
            assert!(listing.result.list.len() <= req.page_size as usize);
            assert_eq!(listing.result.list.len(), 30.min(req.page_size as usize));
        }
    }

    #[tokio::test]
    async fn test_top250_always_scraped() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .respond("https://movie.douban.com/top250", fixture())
                .respond("https://movie.douban.com/j/", subjects_body(10)),
        );
        let catalog = catalog(fetcher.clone());

        for pairs in [
            vec![("type", "movie"), ("tag", "top250")],
            vec![("type", "tv"), ("tag", "top250"), ("sort", "time"), ("pageSize", "50")],
            vec![("type", "movie"), ("tag", "top250"), ("sort", "rank"), ("pageStart", "25")],
        ] {
            let listing = catalog.list(&request(&pairs).unwrap()).await;
            assert_eq!(listing.strategy, Some("direct"));
            assert_eq!(listing.result.list.len(), 3);
        }

        let urls = fetcher.urls_called();
        assert_eq!(urls.len(), 3);
        assert!(urls.iter().all(|u| u.starts_with("https://movie.douban.com/top250?start=")));
        assert!(urls[2].contains("start=25"));
    }

    #[tokio::test]
    async fn test_soft_failure_carries_diagnostics() {
        let catalog = catalog(Arc::new(FakeFetcher::default()));
        let req = request(&[("type", "tv"), ("tag", "日漫"), ("title", "动漫")]).unwrap();
        let listing = catalog.list(&req).await;

        assert!(listing.strategy.is_none());
        assert_eq!(listing.result.code, 200);
        assert!(listing.result.list.is_empty());
        let debug = listing.result.debug.unwrap();
        assert_eq!(debug.original_tag, "日漫");
        assert_eq!(debug.final_tag, "日本动画");
        assert_eq!(debug.attempted, vec!["direct", "allorigins", "corsproxy"]);
        assert_eq!(debug.title.as_deref(), Some("动漫"));
    }

    #[tokio::test]
    async fn test_top250_failure_is_soft_too() {
        let catalog = catalog(Arc::new(
            FakeFetcher::default().fail("https://movie.douban.com", 403),
        ));
        let req = request(&[("type", "movie"), ("tag", "top250")]).unwrap();
        let listing = catalog.list(&req).await;

        assert!(listing.strategy.is_none());
        assert_eq!(listing.result.debug.unwrap().attempted, vec!["direct"]);
    }

    #[tokio::test]
    async fn test_tags_from_douban_and_fallback() {
        let fetcher = Arc::new(FakeFetcher::default().respond(
            "https://relay-a.test",
            allorigins_body("{\"tags\":[\"热门\",\"最新\",\"经典\"]}"),
        ));
        let vocab = catalog(fetcher.clone()).tags(TagCategory::KrDrama).await;
        assert_eq!(vocab.source, TagSource::Douban);
        assert_eq!(vocab.tags, vec!["热门", "最新", "经典"]);
        // 细分剧集按 tv 请求
        assert!(fetcher.urls_called()[0].ends_with("search_tags?type=tv"));

        let vocab = catalog(Arc::new(FakeFetcher::default()))
            .tags(TagCategory::JpAnime)
            .await;
        assert_eq!(vocab.source, TagSource::Fallback);
        assert_eq!(vocab.tags.len(), TagCategory::JpAnime.fallback_tags().len());
    }

    #[tokio::test]
    async fn test_relay_returns_raw_json() {
        let fetcher = Arc::new(
            FakeFetcher::default().respond("https://movie.douban.com", "{\"tags\":[\"热门\"]}"),
        );
        let target =
            validate_relay_target(Some("https://movie.douban.com/j/search_tags?type=movie"))
                .unwrap();
        let resolved = catalog(fetcher).relay(&target).await.unwrap();
        assert_eq!(resolved.value["tags"][0], "热门");
        assert_eq!(resolved.strategy, "direct");

        let err = catalog(Arc::new(FakeFetcher::default()))
            .relay(&target)
            .await
            .unwrap_err();
        match err {
            ApiError::RelayExhausted { tried, .. } => assert_eq!(tried.len(), 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_relay_target_allow_list() {
        assert!(validate_relay_target(Some("https://movie.douban.com/j/x")).is_ok());
        assert!(validate_relay_target(Some("https://douban.com/")).is_ok());
        assert!(matches!(
            validate_relay_target(Some("https://evil-douban.com.example/")),
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            validate_relay_target(Some("https://example.com/?douban.com")),
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            validate_relay_target(Some("not a url")),
            Err(ApiError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_relay_target(None),
            Err(ApiError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_relay_target(Some("ftp://movie.douban.com/")),
            Err(ApiError::InvalidRequest(_))
        ));
    }
}
