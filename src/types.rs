//! 公共数据结构

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 缺失评分时的占位文本
pub const UNRATED: &str = "暂无评分";

/// 不可删除的标签
pub const PROTECTED_TAG: &str = "热门";

/// 走 HTML 抓取路径的合成标签
pub const TOP250_TAG: &str = "top250";

/// 对外输出的影视条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub id: String,
    pub title: String,
    pub poster: String,
    pub rate: String,
}

/// 列表接口响应
///
/// 上游全部失败时仍返回 `code = 200`，通过空 `list` 和诊断字段表达失败。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub code: u16,
    pub message: String,
    pub list: Vec<NormalizedItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<SoftFailureDebug>,
}

impl NormalizedResult {
    pub fn success(list: Vec<NormalizedItem>) -> Self {
        Self {
            code: 200,
            message: "获取成功".to_string(),
            list,
            error: None,
            details: None,
            debug: None,
        }
    }

    pub fn soft_failure(details: String, debug: SoftFailureDebug) -> Self {
        Self {
            code: 200,
            message: "获取数据时遇到问题".to_string(),
            list: Vec::new(),
            error: Some("网络连接问题或豆瓣API限制".to_string()),
            details: Some(details),
            debug: Some(debug),
        }
    }
}

/// 软失败时附带的诊断信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftFailureDebug {
    pub url: String,
    pub original_tag: String,
    pub final_tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub attempted: Vec<String>,
    pub timestamp: String,
}

/// 媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }

    /// 该媒体类型的默认标签列表
    pub fn default_tags(&self) -> &'static [&'static str] {
        match self {
            MediaType::Movie => TagCategory::Movie.fallback_tags(),
            MediaType::Tv => TagCategory::Tv.fallback_tags(),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaType::Movie),
            "tv" => Ok(MediaType::Tv),
            _ => Err("type 参数必须是 tv 或 movie".to_string()),
        }
    }
}

/// 排序方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sort {
    #[default]
    Recommend,
    Time,
    Rank,
}

impl Sort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sort::Recommend => "recommend",
            Sort::Time => "time",
            Sort::Rank => "rank",
        }
    }
}

impl FromStr for Sort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recommend" => Ok(Sort::Recommend),
            "time" => Ok(Sort::Time),
            "rank" => Ok(Sort::Rank),
            _ => Err("sort 参数必须是 recommend、time 或 rank".to_string()),
        }
    }
}

/// 标签分类 (含细分的剧集分类)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagCategory {
    Movie,
    Tv,
    UsDrama,
    KrDrama,
    JpDrama,
    JpAnime,
    Variety,
}

impl TagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagCategory::Movie => "movie",
            TagCategory::Tv => "tv",
            TagCategory::UsDrama => "us_drama",
            TagCategory::KrDrama => "kr_drama",
            TagCategory::JpDrama => "jp_drama",
            TagCategory::JpAnime => "jp_anime",
            TagCategory::Variety => "variety",
        }
    }

    /// 豆瓣接口实际接受的类型，细分剧集都归为 tv
    pub fn douban_type(&self) -> MediaType {
        match self {
            TagCategory::Movie => MediaType::Movie,
            _ => MediaType::Tv,
        }
    }

    /// 上游标签获取失败时使用的内置标签
    pub fn fallback_tags(&self) -> &'static [&'static str] {
        match self {
            TagCategory::Movie => &[
                "热门", "最新", "经典", "豆瓣高分", "冷门佳片", "华语", "欧美", "韩国", "日本",
                "动作", "喜剧", "爱情", "科幻", "悬疑", "恐怖", "治愈",
            ],
            TagCategory::Tv => &[
                "热门", "美剧", "英剧", "韩剧", "日剧", "国产剧", "港剧", "日本动画", "综艺",
                "纪录片",
            ],
            TagCategory::UsDrama => &[
                "热门", "剧情", "喜剧", "犯罪", "科幻", "奇幻", "惊悚", "动作", "爱情", "家庭",
                "医务", "律政",
            ],
            TagCategory::KrDrama => &[
                "热门", "爱情", "剧情", "喜剧", "悬疑", "古装", "现代", "家庭", "职场", "校园",
                "医务", "法律",
            ],
            TagCategory::JpDrama => &[
                "热门", "剧情", "爱情", "喜剧", "悬疑", "推理", "职场", "校园", "家庭", "医务",
                "料理", "时代",
            ],
            TagCategory::JpAnime => &[
                "热门", "冒险", "动作", "喜剧", "剧情", "奇幻", "科幻", "恋爱", "校园", "运动",
                "音乐", "治愈",
            ],
            TagCategory::Variety => &[
                "热门", "脱口秀", "真人秀", "音乐", "舞蹈", "喜剧", "访谈", "游戏", "美食",
                "旅行", "时尚", "体育",
            ],
        }
    }
}

impl FromStr for TagCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(TagCategory::Movie),
            "tv" => Ok(TagCategory::Tv),
            "us_drama" => Ok(TagCategory::UsDrama),
            "kr_drama" => Ok(TagCategory::KrDrama),
            "jp_drama" => Ok(TagCategory::JpDrama),
            "jp_anime" => Ok(TagCategory::JpAnime),
            "variety" => Ok(TagCategory::Variety),
            _ => Err("type 参数必须是有效的分类类型".to_string()),
        }
    }
}
