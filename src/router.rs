use axum::Router;
use tower_http::compression::CompressionLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::features::{colorize, health};
use crate::openapi::ApiDoc;
use crate::request_id::request_id_middleware;
use crate::state::AppState;

/// 响应压缩策略：明确排除不该压缩的响应。
///
/// 着色结果是 JPEG，本身已压缩；JSON 错误体与 OpenAPI 文档仍可压缩。
pub fn compression_predicate() -> impl tower_http::compression::predicate::Predicate {
    use tower_http::compression::predicate::{NotForContentType, Predicate, SizeAbove};

    SizeAbove::default()
        .and(NotForContentType::GRPC)
        .and(NotForContentType::IMAGES)
        .and(NotForContentType::SSE)
        .and(NotForContentType::const_new("application/octet-stream"))
}

/// 组装完整路由：着色、健康检查、文档，以及全局中间件
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::<AppState>::new()
        .merge(health::create_health_router())
        .merge(colorize::create_colorize_router(max_upload_bytes))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(CompressionLayer::new().compress_when(compression_predicate()))
        .layer(axum::middleware::from_fn(request_id_middleware))
}
