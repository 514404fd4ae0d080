use std::time::Instant;

use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Router, routing::post};

use super::codec::OutputFormat;
use super::pipeline::{ColorizeOutcome, colorize_bytes};
use crate::error::AppError;
use crate::state::AppState;

/// 上传字段名
pub const IMAGE_FIELD: &str = "image";

/// multipart 上传体（仅用于 OpenAPI 文档）
#[allow(dead_code)]
#[derive(utoipa::ToSchema)]
pub struct ColorizeUpload {
    /// 待着色的图片文件（任意常见格式，彩色图片同样接受）
    #[schema(value_type = String, format = Binary)]
    image: Vec<u8>,
}

/// 从 multipart 请求中取出 `image` 字段的内容。
///
/// 请求不是 multipart、没有该字段或字段为空时都视为缺少图片。
async fn read_image_field(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Bytes, AppError> {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => {
            tracing::debug!("请求不是合法的 multipart: {}", rejection.body_text());
            return Err(AppError::MissingField);
        }
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(AppError::MissingField),
            Err(e) => return Err(map_multipart_error(e)),
        };
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let bytes = field.bytes().await.map_err(map_multipart_error)?;
        if bytes.is_empty() {
            return Err(AppError::MissingField);
        }
        return Ok(bytes);
    }
}

fn map_multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::Multipart(err.body_text())
    }
}

fn attachment_headers(format: OutputFormat) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(format.content_type()),
    );
    let disposition = format!(
        "attachment; filename=\"colorized_image.{}\"",
        format.extension()
    );
    if let Ok(v) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, v);
    }
    headers
}

#[utoipa::path(
    post,
    path = "/colorize",
    summary = "黑白照片着色",
    description = "上传 multipart 字段 `image`，返回与原图同尺寸的着色图片（附件形式，默认 JPEG）。图片先缩放到 256×256 送入生成网络，再用原始亮度与预测色度合成并缩放回原尺寸。",
    request_body(content = ColorizeUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "着色后的图片字节，默认 JPEG，`output.format = \"png\"` 时为 PNG（Content-Disposition: attachment）"),
        (status = 400, description = "缺少 image 字段", body = crate::error::SimpleErrorBody),
        (status = 413, description = "上传内容过大", body = crate::error::ProblemDetails),
        (status = 500, description = "上传内容无法解码为图片（code=IMAGE_DECODE_FAILED），或推理/流水线内部错误", body = crate::error::ProblemDetails)
    ),
    tag = "Colorize"
)]
pub async fn colorize(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    handle_colorize(state, multipart)
        .await
        .inspect_err(AppError::log)
}

async fn handle_colorize(
    state: AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let t_total = Instant::now();

    let upload = read_image_field(multipart).await?;
    let upload_len = upload.len();
    tracing::debug!(target: "colorize_performance", "收到上传图片，字节大小: {}", upload_len);

    // 等待许可：限制同时运行的着色任务数量
    let sem = state.inference_semaphore.clone();
    let permits_avail = sem.available_permits();
    let t_wait = Instant::now();
    let permit = sem
        .acquire_owned()
        .await
        .map_err(|e| AppError::Internal(format!("获取推理信号量失败: {e}")))?;
    let wait_ms = t_wait.elapsed().as_millis();
    tracing::info!(target: "colorize_performance", "信号量获取完成，可用许可: {}, 等待时间: {}ms", permits_avail, wait_ms);

    // 解码/色彩转换/推理/编码都是 CPU 密集型同步操作，必须移出 tokio worker。
    // 许可随阻塞任务一起移动：客户端断开后任务仍在运行，许可直到任务结束才归还。
    let colorizer = state.colorizer.clone();
    let options = state.pipeline;
    let outcome: ColorizeOutcome = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        colorize_bytes(colorizer.as_ref(), &upload, &options)
    })
    .await??;

    let t = outcome.timings;
    tracing::info!(
        target: "colorize_performance",
        "着色完成，尺寸: {}x{}, 输入 {} 字节, 输出 {} 字节, 解码 {}ms, 预处理 {}ms, 推理 {}ms, 后处理 {}ms, 编码 {}ms, 流水线 {}ms, 总耗时 {}ms",
        outcome.original_size.width,
        outcome.original_size.height,
        upload_len,
        outcome.bytes.len(),
        t.decode.as_millis(),
        t.preprocess.as_millis(),
        t.inference.as_millis(),
        t.postprocess.as_millis(),
        t.encode.as_millis(),
        t.total().as_millis(),
        t_total.elapsed().as_millis()
    );

    let headers = attachment_headers(options.output);
    Ok((StatusCode::OK, headers, Bytes::from(outcome.bytes)).into_response())
}

/// 着色路由；`max_upload_bytes` 限制请求体大小
pub fn create_colorize_router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/colorize", post(colorize))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
