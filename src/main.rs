mod catalog;
mod config;
mod error;
mod http_client;
mod parser;
mod resolver;
mod routes;
mod scrape;
mod strategy;
mod tag_store;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::catalog::Catalog;
use crate::config::{Config, TagStoreBackend};
use crate::http_client::{Fetcher, HttpFetcher};
use crate::resolver::Resolver;
use crate::routes::{router, AppState};
use crate::strategy::Direct;
use crate::tag_store::{FileTagStore, MemoryTagStore, TagPreferences, TagStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志，RUST_LOG 未设置时默认 info
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let config = Config::from_env()?;

    // 解析器
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::default());
    let listing = Resolver::new(
        fetcher.clone(),
        config.listing_strategies.clone(),
        config.attempt_timeout,
    )
    .with_budget(config.resolve_budget);
    let relay = Resolver::new(
        fetcher.clone(),
        config.relay_strategies.clone(),
        config.attempt_timeout,
    )
    .with_budget(config.resolve_budget);
    // Top250 页面只走直连
    let scrape = Resolver::new(fetcher, vec![Arc::new(Direct)], config.scrape_timeout)
        .with_budget(config.resolve_budget);
    let catalog = Catalog::new(listing, relay, scrape);

    for (name, resolver) in catalog.resolvers() {
        info!("🔗 {} 代理链: {}", name, resolver.strategy_names().join(" -> "));
        if let Some(budget) = resolver.budget() {
            if budget < resolver.worst_case() {
                warn!(
                    "⚠️ {} 总时限 {:?} 小于最坏耗时 {:?}，靠后的代理可能来不及尝试",
                    name,
                    budget,
                    resolver.worst_case()
                );
            }
        }
    }

    // 标签存储
    let store: Arc<dyn TagStore> = match &config.tag_store {
        TagStoreBackend::Memory => {
            info!("📦 标签存储: 内存");
            Arc::new(MemoryTagStore::default())
        }
        TagStoreBackend::File(path) => Arc::new(FileTagStore::open(path).await?),
    };

    let state = Arc::new(AppState {
        catalog,
        tags: TagPreferences::new(store),
        cache_time: config.cache_time,
    });
    let app = router(state);

    // 启动服务器
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("🚀 豆瓣代理 API 启动在 http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
