//! 启动配置
//! 全部来自环境变量，启动时读取一次

use crate::strategy::{parse_chain, ProxyStrategy, LISTING_CHAIN, RELAY_CHAIN};
use anyhow::{anyhow, Context};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// 标签存储后端
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagStoreBackend {
    Memory,
    File(PathBuf),
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    /// 单个代理策略的超时
    pub attempt_timeout: Duration,
    /// Top250 页面抓取超时
    pub scrape_timeout: Duration,
    /// 整条策略链的总时限，未设置时不限制
    pub resolve_budget: Option<Duration>,
    /// 列表接口的缓存秒数
    pub cache_time: u64,
    /// 已校验的代理策略链
    pub listing_strategies: Vec<Arc<dyn ProxyStrategy>>,
    pub relay_strategies: Vec<Arc<dyn ProxyStrategy>>,
    pub tag_store: TagStoreBackend,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("PORT") {
            Some(port) => port.parse().with_context(|| format!("无效的 PORT: {}", port))?,
            None => 3000,
        };
        let attempt_timeout = match get("ATTEMPT_TIMEOUT_SECS") {
            Some(secs) => parse_secs("ATTEMPT_TIMEOUT_SECS", &secs)?,
            None => Duration::from_secs(10),
        };
        let scrape_timeout = match get("SCRAPE_TIMEOUT_SECS") {
            Some(secs) => parse_secs("SCRAPE_TIMEOUT_SECS", &secs)?,
            None => Duration::from_secs(10),
        };
        let resolve_budget = get("RESOLVE_BUDGET_SECS")
            .map(|secs| parse_secs("RESOLVE_BUDGET_SECS", &secs))
            .transpose()?;
        let cache_time = match get("CACHE_TIME") {
            Some(cache) => cache
                .parse()
                .with_context(|| format!("无效的 CACHE_TIME: {}", cache))?,
            None => 300,
        };

        let listing = get("LISTING_STRATEGIES").unwrap_or_else(|| LISTING_CHAIN.to_string());
        let listing_strategies =
            parse_chain(&listing).map_err(|e| anyhow!("LISTING_STRATEGIES: {}", e))?;
        let relay = get("RELAY_STRATEGIES").unwrap_or_else(|| RELAY_CHAIN.to_string());
        let relay_strategies =
            parse_chain(&relay).map_err(|e| anyhow!("RELAY_STRATEGIES: {}", e))?;

        let tag_store = match get("TAG_STORE").as_deref() {
            None | Some("memory") => TagStoreBackend::Memory,
            Some("file") => TagStoreBackend::File(
                get("TAG_STORE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("data/tags.json")),
            ),
            Some(other) => return Err(anyhow!("未知的 TAG_STORE: {} (可选 memory/file)", other)),
        };

        Ok(Self {
            port,
            attempt_timeout,
            scrape_timeout,
            resolve_budget,
            cache_time,
            listing_strategies,
            relay_strategies,
            tag_store,
        })
    }
}

fn parse_secs(key: &str, value: &str) -> anyhow::Result<Duration> {
    let secs: u64 = value
        .parse()
        .with_context(|| format!("无效的 {}: {}", key, value))?;
    if secs == 0 {
        return Err(anyhow!("{} 必须大于 0", key));
    }
    Ok(Duration::from_secs(secs))
}
