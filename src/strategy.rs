//! 代理策略
//! 每个策略描述一条访问豆瓣的传输路径：直连，或经由公共 CORS 中转服务

use crate::http_client::OutboundRequest;
use crate::parser::ShapeError;
use serde::Deserialize;
use std::sync::Arc;

pub const DOUBAN_REFERER: &str = "https://movie.douban.com/";

/// 一次请求的上游目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    pub url: String,
    /// 期望的响应类型，写入 Accept 头
    pub accept: &'static str,
}

/// 传输策略
pub trait ProxyStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// 构建实际发送的请求
    fn build_request(&self, target: &UpstreamTarget) -> OutboundRequest;

    /// 去掉中转服务的外层包装，返回上游原始响应文本
    fn unwrap_response(&self, body: String) -> Result<String, ShapeError> {
        Ok(body)
    }
}

/// 直连豆瓣
#[derive(Debug, Default, Clone)]
pub struct Direct;

impl ProxyStrategy for Direct {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn build_request(&self, target: &UpstreamTarget) -> OutboundRequest {
        OutboundRequest::new(target.url.clone())
            .header("Referer", DOUBAN_REFERER)
            .header("Accept", target.accept)
            .header("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8")
            .header("Cache-Control", "no-cache")
    }
}

/// api.allorigins.win，响应包装为 `{"contents": "..."}`
#[derive(Debug, Clone)]
pub struct AllOrigins {
    endpoint: String,
}

impl AllOrigins {
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Default for AllOrigins {
    fn default() -> Self {
        Self::with_endpoint("https://api.allorigins.win/get")
    }
}

#[derive(Deserialize)]
struct AllOriginsEnvelope {
    contents: Option<String>,
}

impl ProxyStrategy for AllOrigins {
    fn name(&self) -> &'static str {
        "allorigins"
    }

    fn build_request(&self, target: &UpstreamTarget) -> OutboundRequest {
        OutboundRequest::new(format!(
            "{}?url={}",
            self.endpoint,
            urlencoding::encode(&target.url)
        ))
        .header("Accept", "application/json")
    }

    fn unwrap_response(&self, body: String) -> Result<String, ShapeError> {
        let envelope: AllOriginsEnvelope = serde_json::from_str(&body)
            .map_err(|e| ShapeError::InvalidEnvelope(e.to_string()))?;
        envelope
            .contents
            .ok_or_else(|| ShapeError::InvalidEnvelope("allorigins 返回格式错误".to_string()))
    }
}

/// corsproxy.io
#[derive(Debug, Clone)]
pub struct CorsProxy {
    endpoint: String,
}

impl CorsProxy {
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Default for CorsProxy {
    fn default() -> Self {
        Self::with_endpoint("https://corsproxy.io/")
    }
}

impl ProxyStrategy for CorsProxy {
    fn name(&self) -> &'static str {
        "corsproxy"
    }

    fn build_request(&self, target: &UpstreamTarget) -> OutboundRequest {
        OutboundRequest::new(format!(
            "{}?{}",
            self.endpoint,
            urlencoding::encode(&target.url)
        ))
        .header("Accept", target.accept)
    }
}

/// cors-anywhere，目标 URL 原样拼在路径后
#[derive(Debug, Clone)]
pub struct CorsAnywhere {
    endpoint: String,
}

impl CorsAnywhere {
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Default for CorsAnywhere {
    fn default() -> Self {
        Self::with_endpoint("https://cors-anywhere.herokuapp.com")
    }
}

impl ProxyStrategy for CorsAnywhere {
    fn name(&self) -> &'static str {
        "cors-anywhere"
    }

    fn build_request(&self, target: &UpstreamTarget) -> OutboundRequest {
        OutboundRequest::new(format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            target.url
        ))
        .header("Accept", target.accept)
        // cors-anywhere 拒绝不带该头的请求
        .header("X-Requested-With", "XMLHttpRequest")
    }
}

/// thingproxy.freeboard.io
#[derive(Debug, Clone)]
pub struct ThingProxy {
    endpoint: String,
}

impl ThingProxy {
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Default for ThingProxy {
    fn default() -> Self {
        Self::with_endpoint("https://thingproxy.freeboard.io/fetch")
    }
}

impl ProxyStrategy for ThingProxy {
    fn name(&self) -> &'static str {
        "thingproxy"
    }

    fn build_request(&self, target: &UpstreamTarget) -> OutboundRequest {
        OutboundRequest::new(format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            urlencoding::encode(&target.url)
        ))
        .header("Accept", target.accept)
    }
}

/// 按名称查找内置策略
pub fn strategy_by_name(name: &str) -> Option<Arc<dyn ProxyStrategy>> {
    let strategy: Arc<dyn ProxyStrategy> = match name {
        "direct" => Arc::new(Direct),
        "allorigins" => Arc::new(AllOrigins::default()),
        "corsproxy" => Arc::new(CorsProxy::default()),
        "cors-anywhere" => Arc::new(CorsAnywhere::default()),
        "thingproxy" => Arc::new(ThingProxy::default()),
        _ => return None,
    };
    Some(strategy)
}

/// 解析逗号分隔的策略列表，保持声明顺序
pub fn parse_chain(names: &str) -> Result<Vec<Arc<dyn ProxyStrategy>>, String> {
    let mut chain = Vec::new();
    for name in names.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let strategy = strategy_by_name(name).ok_or_else(|| format!("未知的代理策略: {}", name))?;
        if chain.iter().any(|s: &Arc<dyn ProxyStrategy>| s.name() == name) {
            return Err(format!("代理策略重复: {}", name));
        }
        chain.push(strategy);
    }
    if chain.is_empty() {
        return Err("代理策略列表为空".to_string());
    }
    Ok(chain)
}

/// 列表接口默认策略
pub const LISTING_CHAIN: &str = "direct,allorigins,corsproxy";

/// 通用中转接口默认策略
pub const RELAY_CHAIN: &str = "direct,allorigins,cors-anywhere,thingproxy";
