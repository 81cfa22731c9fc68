use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use log::info;
use tokio::task::spawn_blocking;

use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::error::SearchError;
use crate::query::Query;
use crate::utils::round_to;

/// 健康检查
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string(), model_loaded: state.is_loaded() })
}

/// 使用文本或图片搜索
#[utoipa::path(
    post,
    path = "/search",
    request_body = SearchRequest,
    responses(
        (status = 200, body = SearchResponse),
        (status = 400, body = ErrorResponse),
        (status = 503, body = ErrorResponse),
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>> {
    let Json(data) = payload.map_err(|e| SearchError::invalid(e.body_text()))?;
    let searcher = state.searcher().ok_or(SearchError::Unavailable)?;

    let max_top_k = state.search.max_top_k;
    let top_k = data.top_k.unwrap_or(state.search.default_top_k as i64);
    if top_k < 1 || top_k > max_top_k as i64 {
        return Err(SearchError::invalid(format!("top_k 必须在 1 到 {max_top_k} 之间")).into());
    }

    let query = data.to_query()?;
    let label = match &query {
        Query::Text(text) => text.clone(),
        Query::Image(_) => IMAGE_QUERY_LABEL.to_string(),
    };
    info!("正在搜索: {} (top_k={})", label, top_k);

    let start = Instant::now();
    let results = spawn_blocking(move || searcher.search(&query, top_k as usize)).await??;
    let latency_ms = round_to(start.elapsed().as_secs_f64() * 1000.0, 2);

    Ok(Json(SearchResponse { query: label, results, latency_ms }))
}
