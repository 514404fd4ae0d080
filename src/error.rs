use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 缺少上传字段时的固定提示（对外契约）
pub const MISSING_IMAGE_MESSAGE: &str = "No image file found";

/// 应用统一错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 请求中没有 `image` 字段
    #[error("No image file found")]
    MissingField,

    /// 请求体超过上传限制
    #[error("上传内容过大: {0}")]
    PayloadTooLarge(String),

    /// multipart 请求体格式错误
    #[error("multipart 解析错误: {0}")]
    Multipart(String),

    /// 着色流水线错误
    #[error(transparent)]
    Colorize(#[from] ColorizeError),

    /// 内部服务器错误
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 着色流水线错误类型
#[derive(Error, Debug)]
pub enum ColorizeError {
    /// 上传内容不是可解码的图片，或尺寸退化
    #[error("图像解码失败: {0}")]
    Decode(String),

    /// 内部张量形状不符合约定（流水线缺陷）
    #[error("张量形状不符合约定（{context}），实际形状: {shape:?}")]
    Shape {
        /// 出错位置
        context: &'static str,
        /// 实际形状
        shape: Vec<usize>,
    },

    /// 推理后端错误（原样透传）
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// 图像编码失败
    #[error("图像编码失败: {0}")]
    Encode(String),
}

impl ColorizeError {
    /// 是否由客户端输入导致（决定日志级别与是否返回具体原因）
    pub fn is_client_error(&self) -> bool {
        matches!(self, ColorizeError::Decode(_))
    }
}

/// 推理后端错误类型
#[derive(Error, Debug)]
pub enum InferenceError {
    /// 当前构建不支持所选后端
    #[error("推理后端不可用: {0}")]
    Unavailable(String),

    /// 模型加载失败
    #[error("模型加载失败: {0}")]
    Load(String),

    /// 推理执行失败
    #[error("推理执行失败: {0}")]
    Run(String),

    /// 模型输出无法解释为张量
    #[error("模型输出无效: {0}")]
    InvalidOutput(String),
}

/// 缺少图片时的固定错误体：`{"error": "..."}`
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SimpleErrorBody {
    #[schema(example = "No image file found")]
    pub error: String,
}

/// RFC7807 风格的错误响应（Problem Details）。
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    /// 问题类型（URI）。若无更细分的类型，可使用 about:blank。
    #[serde(rename = "type")]
    #[schema(example = "about:blank")]
    pub type_url: String,

    /// 简短标题，用于概括错误。
    #[schema(example = "Internal Server Error")]
    pub title: String,

    /// HTTP 状态码（与响应 status 一致）。
    #[schema(example = 500)]
    pub status: u16,

    /// 人类可读的详细信息；服务端错误只返回通用描述。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// 稳定的错误码，用于程序化处理。
    #[schema(example = "IMAGE_DECODE_FAILED")]
    pub code: String,

    /// 请求追踪 ID。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingField => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Multipart(_) => StatusCode::BAD_REQUEST,
            // 解码失败同样按服务端错误返回，用稳定错误码与内部错误区分
            AppError::Colorize(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn stable_code(&self) -> &'static str {
        match self {
            AppError::MissingField => "MISSING_IMAGE",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::Multipart(_) => "BAD_REQUEST",
            AppError::Colorize(e) => match e {
                ColorizeError::Decode(_) => "IMAGE_DECODE_FAILED",
                ColorizeError::Shape { .. } => "PIPELINE_SHAPE_ERROR",
                ColorizeError::Inference(_) => "INFERENCE_FAILED",
                ColorizeError::Encode(_) => "IMAGE_ENCODE_FAILED",
            },
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn title(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "Bad Request",
            StatusCode::PAYLOAD_TOO_LARGE => "Payload Too Large",
            StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
            _ => "Error",
        }
    }

    fn is_client_caused(&self) -> bool {
        matches!(self, AppError::Colorize(e) if e.is_client_error())
    }

    /// 记录错误日志：客户端错误与内部不变量破坏分级记录
    pub fn log(&self) {
        match self {
            AppError::MissingField => tracing::debug!("请求缺少 image 字段"),
            AppError::PayloadTooLarge(_) | AppError::Multipart(_) => {
                tracing::warn!("上传请求被拒绝: {}", self)
            }
            AppError::Colorize(ColorizeError::Decode(msg)) => {
                tracing::warn!("上传内容无法解码: {}", msg)
            }
            AppError::Colorize(ColorizeError::Shape { context, shape }) => {
                tracing::error!(
                    target: "colorize_invariant",
                    context,
                    shape = ?shape,
                    "流水线不变量被破坏: {}",
                    self
                )
            }
            AppError::Colorize(ColorizeError::Inference(e)) => {
                tracing::error!("推理后端失败: {}", e)
            }
            AppError::Colorize(ColorizeError::Encode(_)) | AppError::Internal(_) => {
                tracing::error!("{}", self)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 缺少字段返回固定的简单错误体，客户端直接读取 `error`。
        if matches!(self, AppError::MissingField) {
            let body = SimpleErrorBody {
                error: MISSING_IMAGE_MESSAGE.to_string(),
            };
            return (status, Json(body)).into_response();
        }

        // 5xx 只返回通用描述，具体原因写日志；由上传内容导致的错误除外。
        let detail = if status.is_server_error() && !self.is_client_caused() {
            Some("服务内部错误，请稍后重试".to_string())
        } else {
            Some(self.to_string())
        };

        let problem = ProblemDetails {
            type_url: "about:blank".to_string(),
            title: self.title().to_string(),
            status: status.as_u16(),
            detail,
            code: self.stable_code().to_string(),
            request_id: crate::request_id::current_request_id(),
        };

        let mut res = Json(problem).into_response();
        *res.status_mut() = status;
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        res
    }
}

// =============== Error conversions for common external errors ===============

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            AppError::Internal("着色任务发生 panic".to_string())
        } else {
            AppError::Internal(format!("着色任务被取消: {err}"))
        }
    }
}
