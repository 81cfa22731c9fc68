mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::error::AppError;
pub use self::state::*;
pub use self::types::*;

#[derive(OpenApi)]
#[openapi(
    info(title = "EO Visual Scout API", description = "EuroSAT 卫星图像多语言语义搜索"),
    paths(api::health_handler, api::search_handler),
    components(schemas(SearchRequest, SearchResponse, HealthResponse, ErrorResponse, crate::SearchResult))
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    let images = ServeDir::new(state.data_dir.images());

    Router::new()
        .route("/health", get(api::health_handler))
        .route("/search", post(api::search_handler))
        // 供前端展示搜索结果中的图片
        .nest_service("/images", images)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        // 上传限制：10M
        .layer(RequestBodyLimitLayer::new(1024 * 1024 * 10))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
