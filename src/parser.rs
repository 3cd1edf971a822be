//! 响应解析与结构校验
//! 解析失败只代表当前策略失败，由解析器决定下一步

use crate::types::{NormalizedItem, UNRATED};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub const ACCEPT_JSON: &str = "application/json, text/plain, */*";
pub const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("代理返回包装格式错误: {0}")]
    InvalidEnvelope(String),
    #[error("JSON 解析失败: {0}")]
    InvalidJson(String),
    #[error("返回数据格式不正确: 缺少 {0}")]
    MissingField(&'static str),
    #[error("页面中没有可识别的条目")]
    NoEntries,
    #[error("{0} 个条目全部缺少必要字段")]
    NoValidSubjects(usize),
}

/// 把上游响应文本解析为声明的结构
pub trait PayloadParser: Send + Sync {
    type Output: Send;

    /// 请求时使用的 Accept 头
    fn accept(&self) -> &'static str {
        ACCEPT_JSON
    }

    fn parse(&self, body: &str) -> Result<Self::Output, ShapeError>;
}

fn parse_json(body: &str) -> Result<Value, ShapeError> {
    serde_json::from_str(body).map_err(|e| ShapeError::InvalidJson(e.to_string()))
}

/// `j/search_subjects` 接口
#[derive(Debug, Default, Clone, Copy)]
pub struct SubjectsParser;

#[derive(Deserialize)]
struct RawSubject {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    title: Value,
    #[serde(default)]
    cover: Value,
    #[serde(default)]
    rate: Value,
}

/// 字符串或数字字段转为非空字符串
fn scalar_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl RawSubject {
    fn normalize(self) -> Option<NormalizedItem> {
        let id = scalar_string(self.id)?;
        let title = scalar_string(self.title)?;
        let poster = match self.cover {
            Value::String(c) if !c.is_empty() => c,
            _ => return None,
        };
        let rate = scalar_string(self.rate).unwrap_or_else(|| UNRATED.to_string());

        Some(NormalizedItem {
            id,
            title,
            poster,
            rate,
        })
    }
}

impl PayloadParser for SubjectsParser {
    type Output = Vec<NormalizedItem>;

    fn parse(&self, body: &str) -> Result<Self::Output, ShapeError> {
        let mut value = parse_json(body)?;
        let subjects = match value.get_mut("subjects").map(Value::take) {
            Some(Value::Array(subjects)) => subjects,
            _ => return Err(ShapeError::MissingField("subjects")),
        };

        let total = subjects.len();
        let items: Vec<_> = subjects
            .into_iter()
            .filter_map(|s| serde_json::from_value::<RawSubject>(s).ok())
            .filter_map(RawSubject::normalize)
            .collect();

        if total > 0 && items.is_empty() {
            return Err(ShapeError::NoValidSubjects(total));
        }
        if items.len() < total {
            debug!("丢弃 {} 个字段不完整的条目", total - items.len());
        }

        Ok(items)
    }
}

/// `j/search_tags` 接口
#[derive(Debug, Default, Clone, Copy)]
pub struct TagsParser;

impl PayloadParser for TagsParser {
    type Output = Vec<String>;

    fn parse(&self, body: &str) -> Result<Self::Output, ShapeError> {
        let value = parse_json(body)?;
        let tags = value
            .get("tags")
            .and_then(Value::as_array)
            .ok_or(ShapeError::MissingField("tags"))?;

        Ok(tags
            .iter()
            .filter_map(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// 任意 JSON，原样中转
#[derive(Debug, Default, Clone, Copy)]
pub struct RawJsonParser;

impl PayloadParser for RawJsonParser {
    type Output = Value;

    fn parse(&self, body: &str) -> Result<Self::Output, ShapeError> {
        parse_json(body)
    }
}
