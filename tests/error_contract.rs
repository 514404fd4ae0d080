use axum::{
    http::{StatusCode, header},
    response::IntoResponse,
};
use colorize_backend::{AppError, ColorizeError, InferenceError};

async fn json_of(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

fn content_type(resp: &axum::response::Response) -> String {
    resp.headers()
        .get(header::CONTENT_TYPE)
        .expect("missing Content-Type")
        .to_str()
        .expect("invalid Content-Type")
        .to_string()
}

/// 缺少字段返回固定错误体：`400 {"error": "No image file found"}`，不含其他字段。
#[tokio::test]
async fn missing_field_returns_fixed_error_body() {
    let resp = AppError::MissingField.into_response();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(content_type(&resp), "application/json");

    let v = json_of(resp).await;
    assert_eq!(v, serde_json::json!({ "error": "No image file found" }));
}

/// 其余错误统一为 RFC7807 ProblemDetails（application/problem+json）。
/// 解码失败按服务端错误返回，但保留具体原因，便于客户端定位上传内容问题。
#[tokio::test]
async fn decode_error_is_server_error_problem_details() {
    let resp = AppError::from(ColorizeError::Decode("无法识别的图片格式".into())).into_response();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(content_type(&resp), "application/problem+json");

    let v = json_of(resp).await;
    assert_eq!(v["status"], 500);
    assert_eq!(v["code"], "IMAGE_DECODE_FAILED");
    assert!(v.get("type").is_some());
    assert!(v.get("title").is_some());
    assert!(
        v["detail"]
            .as_str()
            .is_some_and(|d| d.contains("无法识别的图片格式"))
    );
}

/// 服务端错误不向客户端泄露内部细节。
#[tokio::test]
async fn server_errors_hide_internal_detail() {
    let cases = [
        (
            AppError::from(ColorizeError::Shape {
                context: "Lab 缓冲应为 (3, H, W)",
                shape: vec![4, 256, 256],
            }),
            "PIPELINE_SHAPE_ERROR",
        ),
        (
            AppError::from(ColorizeError::from(InferenceError::Run(
                "CUDA out of memory".into(),
            ))),
            "INFERENCE_FAILED",
        ),
        (
            AppError::from(ColorizeError::Encode("writer closed".into())),
            "IMAGE_ENCODE_FAILED",
        ),
        (AppError::Internal("panic".into()), "INTERNAL_ERROR"),
    ];

    for (err, code) in cases {
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let v = json_of(resp).await;
        assert_eq!(v["code"], code);
        let detail = v["detail"].as_str().unwrap_or("");
        assert!(!detail.contains("256"), "{detail}");
        assert!(!detail.contains("CUDA"), "{detail}");
    }
}

#[tokio::test]
async fn payload_too_large_maps_to_413() {
    let resp = AppError::PayloadTooLarge("length limit exceeded".into()).into_response();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let v = json_of(resp).await;
    assert_eq!(v["code"], "PAYLOAD_TOO_LARGE");
}

/// 对外 JSON 字段命名统一 camelCase。
#[test]
fn problem_details_serializes_as_camel_case() {
    let problem = colorize_backend::error::ProblemDetails {
        type_url: "about:blank".into(),
        title: "Bad Request".into(),
        status: 400,
        detail: None,
        code: "BAD_REQUEST".into(),
        request_id: Some("req_1".into()),
    };
    let v = serde_json::to_value(problem).expect("serialize json");
    assert!(v.get("requestId").is_some());
    assert!(v.get("request_id").is_none());
    assert!(v.get("detail").is_none());
    assert_eq!(v["type"], "about:blank");
}
