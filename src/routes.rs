//! HTTP 路由与处理函数

use crate::catalog::{validate_relay_target, Catalog, ListingQuery, ListingRequest};
use crate::error::ApiError;
use crate::tag_store::{TagPreferences, TagScope};
use crate::types::{MediaType, TagCategory};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// 标签词表缓存 1 小时
const TAGS_CACHE_SECS: u64 = 3600;
/// 中转结果缓存 5 分钟
const RELAY_CACHE_SECS: u64 = 300;

const CLIENT_ID_HEADER: &str = "x-client-id";
const ANONYMOUS_CLIENT: &str = "anonymous";

pub struct AppState {
    pub catalog: Catalog,
    pub tags: TagPreferences,
    /// 列表接口缓存秒数
    pub cache_time: u64,
}

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(CLIENT_ID_HEADER)]);

    Router::new()
        .route("/", get(api_info_handler))
        .route("/api", get(api_info_handler))
        .route("/health", get(health_handler))
        // 豆瓣列表
        .route("/resolve", get(resolve_handler))
        .route("/api/douban", get(resolve_handler))
        // 豆瓣标签词表
        .route("/resolve/tags", get(vocabulary_handler))
        .route("/api/douban/tags", get(vocabulary_handler))
        // 通用中转
        .route("/proxy", get(proxy_handler))
        .route("/api/proxy", get(proxy_handler))
        // 标签偏好
        .route("/tags/{media}", get(list_tags_handler).post(add_tag_handler))
        .route("/tags/{media}/reset", post(reset_tags_handler))
        .route("/tags/{media}/{tag}", delete(delete_tag_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// JSON 响应并附带缓存策略与自定义头
fn cached_json<T: Serialize>(
    cache_control: &str,
    extra: &[(&'static str, String)],
    body: &T,
) -> Response {
    let mut response = Json(body).into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(cache_control) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    for (name, value) in extra {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(HeaderName::from_static(*name), value);
        }
    }
    response
}

fn public_cache(max_age: u64) -> String {
    format!("public, max-age={}", max_age)
}

/// GET /api - API 信息
async fn api_info_handler() -> impl IntoResponse {
    Json(json!({
        "name": "Douban Relay",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "豆瓣影视目录代理后端",
        "endpoints": {
            "GET /resolve": "豆瓣列表 (?type=movie|tv&tag=&sort=recommend|time|rank&pageSize=1-100&pageStart=)",
            "GET /resolve/tags": "豆瓣标签 (?type=movie|tv|us_drama|kr_drama|jp_drama|jp_anime|variety)",
            "GET /proxy": "豆瓣 JSON 中转 (?url=)",
            "GET /tags/{media}": "读取标签 (?category=)",
            "POST /tags/{media}": "添加标签 (JSON: {\"tag\": \"...\"})",
            "DELETE /tags/{media}/{tag}": "删除标签",
            "POST /tags/{media}/reset": "恢复默认标签",
            "GET /health": "健康检查"
        },
        "note": "标签偏好按 X-Client-Id 请求头区分客户端"
    }))
}

/// 健康检查
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// GET /resolve - 豆瓣列表
async fn resolve_handler(
    State(state): State<SharedState>,
    Query(query): Query<ListingQuery>,
) -> Result<Response, ApiError> {
    let req = ListingRequest::try_from(query)?;
    info!(
        "🔍 列表: {} / {} (sort={}, size={}, start={})",
        req.media,
        req.tag,
        req.sort.as_str(),
        req.page_size,
        req.page_start
    );

    let listing = state.catalog.list(&req).await;
    let mut extra = vec![
        ("x-douban-tag", urlencoding::encode(&listing.final_tag).into_owned()),
        ("x-original-tag", urlencoding::encode(&listing.original_tag).into_owned()),
    ];
    let cache_control = match listing.strategy {
        Some(strategy) => {
            extra.push(("x-proxy-service", strategy.to_string()));
            public_cache(state.cache_time)
        }
        // 空结果不缓存，下次请求可重新尝试
        None => "no-store".to_string(),
    };

    Ok(cached_json(&cache_control, &extra, &listing.result))
}

#[derive(Debug, Deserialize)]
struct VocabularyQuery {
    #[serde(rename = "type")]
    category: Option<String>,
}

/// GET /resolve/tags - 豆瓣标签词表
async fn vocabulary_handler(
    State(state): State<SharedState>,
    Query(query): Query<VocabularyQuery>,
) -> Result<Response, ApiError> {
    let category: TagCategory = query
        .category
        .as_deref()
        .unwrap_or_default()
        .parse()
        .map_err(ApiError::InvalidRequest)?;

    let vocab = state.catalog.tags(category).await;
    let body = json!({
        "code": 200,
        "message": "获取成功",
        "type": vocab.category,
        "tags": vocab.tags,
        "source": vocab.source,
    });
    Ok(cached_json(&public_cache(TAGS_CACHE_SECS), &[], &body))
}

#[derive(Debug, Deserialize)]
struct ProxyQuery {
    url: Option<String>,
}

/// GET /proxy - 豆瓣 JSON 中转
async fn proxy_handler(
    State(state): State<SharedState>,
    Query(query): Query<ProxyQuery>,
) -> Result<Response, ApiError> {
    let target = validate_relay_target(query.url.as_deref())?;
    info!("🔁 中转: {}", target);

    let resolved = state.catalog.relay(&target).await?;
    Ok(cached_json(
        &public_cache(RELAY_CACHE_SECS),
        &[("x-proxy-service", resolved.strategy.to_string())],
        &resolved.value,
    ))
}

#[derive(Debug, Default, Deserialize)]
struct ScopeQuery {
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddTagBody {
    tag: String,
}

/// 由路径、查询参数和客户端头组成标签归属
fn tag_scope(headers: &HeaderMap, media: &str, query: &ScopeQuery) -> Result<TagScope, ApiError> {
    let media: MediaType = media.parse().map_err(ApiError::InvalidRequest)?;
    let category = match query.category.as_deref().filter(|c| !c.is_empty()) {
        Some(c) => Some(c.parse::<TagCategory>().map_err(ApiError::InvalidRequest)?),
        None => None,
    };
    let client = headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(ANONYMOUS_CLIENT);

    Ok(TagScope::new(client, media, category))
}

fn tags_response(scope: &TagScope, tags: Vec<String>) -> Response {
    Json(json!({
        "type": scope.media,
        "category": scope.category,
        "tags": tags,
    }))
    .into_response()
}

/// GET /tags/{media}
async fn list_tags_handler(
    State(state): State<SharedState>,
    Path(media): Path<String>,
    Query(query): Query<ScopeQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let scope = tag_scope(&headers, &media, &query)?;
    let tags = state.tags.load(&scope).await?;
    Ok(tags_response(&scope, tags))
}

/// POST /tags/{media}
async fn add_tag_handler(
    State(state): State<SharedState>,
    Path(media): Path<String>,
    Query(query): Query<ScopeQuery>,
    headers: HeaderMap,
    Json(body): Json<AddTagBody>,
) -> Result<Response, ApiError> {
    let scope = tag_scope(&headers, &media, &query)?;
    let tags = state.tags.add(&scope, &body.tag).await?;
    info!("🏷️ 添加标签 {}: {}", scope.key(), body.tag.trim());
    Ok(tags_response(&scope, tags))
}

/// DELETE /tags/{media}/{tag}
async fn delete_tag_handler(
    State(state): State<SharedState>,
    Path((media, tag)): Path<(String, String)>,
    Query(query): Query<ScopeQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let scope = tag_scope(&headers, &media, &query)?;
    let tags = state.tags.remove(&scope, &tag).await?;
    info!("🗑️ 删除标签 {}: {}", scope.key(), tag);
    Ok(tags_response(&scope, tags))
}

/// POST /tags/{media}/reset
async fn reset_tags_handler(
    State(state): State<SharedState>,
    Path(media): Path<String>,
    Query(query): Query<ScopeQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let scope = tag_scope(&headers, &media, &query)?;
    let tags = state.tags.reset(&scope).await?;
    info!("♻️ 重置标签 {}", scope.key());
    Ok(tags_response(&scope, tags))
}
