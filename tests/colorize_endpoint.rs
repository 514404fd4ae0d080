use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use colorize_backend::InferenceError;
use colorize_backend::config::{AppConfig, OutputKind};
use colorize_backend::features::colorize::tensor::{NormalizedLightness, PredictedChroma};
use colorize_backend::features::colorize::{Colorizer, NeutralColorizer, PipelineOptions};
use colorize_backend::{AppState, build_router};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use ndarray::Array3;
use tower::ServiceExt;

const BOUNDARY: &str = "colorizeTestBoundary";

fn build_app(colorizer: Arc<dyn Colorizer>, max_upload_bytes: usize) -> Router {
    let state = AppState::new(colorizer, PipelineOptions::default(), 2);
    build_router(state, max_upload_bytes)
}

fn neutral_app() -> Router {
    build_app(Arc::new(NeutralColorizer), 1024 * 1024)
}

fn gray_png(width: u32, height: u32) -> Vec<u8> {
    let img = GrayImage::from_fn(width, height, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]));
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode png");
    buf
}

/// 手工拼装 multipart 请求体
fn multipart_body(field: &str, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"upload.png\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(field: &str, payload: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/colorize")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(field, payload)))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

#[tokio::test]
async fn missing_image_field_returns_fixed_error_body() {
    let resp = neutral_app()
        .oneshot(upload_request("photo", &gray_png(8, 8)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], br#"{"error":"No image file found"}"#);
}

#[tokio::test]
async fn empty_image_field_is_treated_as_missing() {
    let resp = neutral_app()
        .oneshot(upload_request("image", b""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(resp).await,
        serde_json::json!({ "error": "No image file found" })
    );
}

#[tokio::test]
async fn non_multipart_request_is_treated_as_missing() {
    let resp = neutral_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/colorize")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "No image file found");
}

#[tokio::test]
async fn successful_upload_returns_jpeg_attachment_with_same_geometry() {
    for (w, h) in [(100, 150), (256, 256), (512, 300)] {
        let resp = neutral_app()
            .oneshot(upload_request("image", &gray_png(w, h)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(
            resp.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"colorized_image.jpg\""
        );

        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let out = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg)
            .expect("decode jpeg");
        assert_eq!((out.width(), out.height()), (w, h));
    }
}

#[tokio::test]
async fn png_output_is_served_as_png_attachment() {
    let mut config = AppConfig::default();
    config.output.format = OutputKind::Png;
    let state = AppState::from_config(Arc::new(NeutralColorizer), &config);
    let resp = build_router(state, 1024 * 1024)
        .oneshot(upload_request("image", &gray_png(120, 80)))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"colorized_image.png\""
    );
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let out = image::load_from_memory_with_format(&bytes, ImageFormat::Png).expect("decode png");
    assert_eq!((out.width(), out.height()), (120, 80));
}

#[tokio::test]
async fn decode_failure_does_not_affect_next_request() {
    let app = neutral_app();

    let resp = app
        .clone()
        .oneshot(upload_request("image", b"%PDF-1.4 definitely not a raster image"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        resp.headers()[header::CONTENT_TYPE],
        "application/problem+json"
    );
    assert_eq!(body_json(resp).await["code"], "IMAGE_DECODE_FAILED");

    let resp = app
        .oneshot(upload_request("image", &gray_png(64, 32)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn oversized_upload_is_rejected_with_413() {
    let app = build_app(Arc::new(NeutralColorizer), 4 * 1024);
    let resp = app
        .oneshot(upload_request("image", &vec![0u8; 64 * 1024]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

struct ThreeChannelColorizer;

impl Colorizer for ThreeChannelColorizer {
    fn backend_name(&self) -> &'static str {
        "three-channel"
    }

    fn infer(&self, _: &NormalizedLightness) -> Result<PredictedChroma, InferenceError> {
        Ok(PredictedChroma::new(Array3::zeros((3, 256, 256))))
    }
}

#[tokio::test]
async fn wrong_chroma_channel_count_is_an_internal_shape_error() {
    let app = build_app(Arc::new(ThreeChannelColorizer), 1024 * 1024);
    let resp = app
        .oneshot(upload_request("image", &gray_png(20, 20)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(resp).await["code"], "PIPELINE_SHAPE_ERROR");
}

struct FailingColorizer;

impl Colorizer for FailingColorizer {
    fn backend_name(&self) -> &'static str {
        "failing"
    }

    fn infer(&self, _: &NormalizedLightness) -> Result<PredictedChroma, InferenceError> {
        Err(InferenceError::Run("device lost".to_string()))
    }
}

#[tokio::test]
async fn inference_failure_is_reported_as_server_error() {
    let app = build_app(Arc::new(FailingColorizer), 1024 * 1024);
    let resp = app
        .oneshot(upload_request("image", &gray_png(20, 20)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(resp).await["code"], "INFERENCE_FAILED");
}

/// 第一次调用 panic，之后返回中性色度
struct PanicOnceColorizer {
    calls: AtomicUsize,
}

impl Colorizer for PanicOnceColorizer {
    fn backend_name(&self) -> &'static str {
        "panic-once"
    }

    fn infer(&self, lightness: &NormalizedLightness) -> Result<PredictedChroma, InferenceError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("simulated backend crash");
        }
        NeutralColorizer.infer(lightness)
    }
}

#[tokio::test]
async fn panicking_backend_only_fails_its_own_request() {
    let app = build_app(
        Arc::new(PanicOnceColorizer {
            calls: AtomicUsize::new(0),
        }),
        1024 * 1024,
    );

    let resp = app
        .clone()
        .oneshot(upload_request("image", &gray_png(16, 16)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(resp).await["code"], "INTERNAL_ERROR");

    let resp = app
        .oneshot(upload_request("image", &gray_png(16, 16)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_reports_active_backend() {
    let app = build_app(Arc::new(FailingColorizer), 1024 * 1024);
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    assert_eq!(v["status"], "healthy");
    assert_eq!(v["backend"], "failing");
    assert_eq!(v["availablePermits"], 2);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let resp = neutral_app()
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    assert!(v["paths"]["/colorize"]["post"].is_object());
}

/// 每次推理耗时固定，并记录同时运行的最大任务数
struct SlowColorizer {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Colorizer for SlowColorizer {
    fn backend_name(&self) -> &'static str {
        "slow"
    }

    fn infer(&self, lightness: &NormalizedLightness) -> Result<PredictedChroma, InferenceError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(400));
        self.active.fetch_sub(1, Ordering::SeqCst);
        NeutralColorizer.infer(lightness)
    }
}

#[tokio::test]
async fn disconnected_client_keeps_its_permit_until_the_job_ends() {
    let slow = Arc::new(SlowColorizer {
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let state = AppState::new(slow.clone(), PipelineOptions::default(), 1);
    let semaphore = state.inference_semaphore.clone();
    let app = build_router(state, 1024 * 1024);

    // 客户端在推理进行中断开：请求 future 被丢弃
    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        app.clone()
            .oneshot(upload_request("image", &gray_png(16, 16))),
    )
    .await;
    assert!(abandoned.is_err(), "request should still be running");
    assert_eq!(semaphore.available_permits(), 0);

    let resp = app
        .oneshot(upload_request("image", &gray_png(16, 16)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(slow.peak.load(Ordering::SeqCst), 1);
    assert_eq!(semaphore.available_permits(), 1);
}
