use utoipa::OpenApi;

/// OpenAPI 文档（`/api-docs/openapi.json`，Swagger UI 挂载在 `/docs`）
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::features::health::handler::health_check,
        crate::features::colorize::handler::colorize,
    ),
    components(schemas(
        crate::error::ProblemDetails,
        crate::error::SimpleErrorBody,
        crate::features::health::handler::HealthResponse,
        crate::features::colorize::handler::ColorizeUpload,
    )),
    tags(
        (
            name = "Colorize",
            description = "照片着色：上传黑白（或彩色）图片，返回同尺寸的着色 JPEG。"
        ),
        (name = "Health", description = "健康检查：服务探活与推理后端信息。"),
    ),
    info(
        title = "Colorize Backend API",
        version = env!("CARGO_PKG_VERSION"),
        description = "照片着色服务 API（Axum + utoipa）。"
    )
)]
pub struct ApiDoc;
