use std::fs;

use crate::config::{AppConfig, ModelBackend};
use crate::error::AppError;

/// 执行启动检查
///
/// 1. 校验上传与输出配置
/// 2. ONNX 后端：确认模型文件存在且是普通文件
pub fn run_startup_checks(config: &AppConfig) -> Result<(), AppError> {
    tracing::info!(
        "🔍 开始执行启动检查，推理后端: {}",
        config.model.backend.as_str()
    );

    check_limits(config)?;

    match config.model.backend {
        ModelBackend::Onnx => ensure_model_file(config)?,
        ModelBackend::Neutral => {
            tracing::warn!("⚠️ 推理后端为 neutral，跳过模型文件检查");
        }
    }

    tracing::info!("✅ 启动检查完成");
    Ok(())
}

fn check_limits(config: &AppConfig) -> Result<(), AppError> {
    if config.upload.max_bytes == 0 {
        return Err(AppError::Internal("upload.max_bytes 必须大于 0".to_string()));
    }
    if config.upload.max_dimension == 0 {
        return Err(AppError::Internal(
            "upload.max_dimension 必须大于 0".to_string(),
        ));
    }
    if !(1..=100).contains(&config.output.jpeg_quality) {
        return Err(AppError::Internal(format!(
            "output.jpeg_quality 必须在 1-100 范围内，当前为 {}",
            config.output.jpeg_quality
        )));
    }
    Ok(())
}

/// 确保模型文件存在
fn ensure_model_file(config: &AppConfig) -> Result<(), AppError> {
    let path = config.model.model_path();
    let meta = fs::metadata(&path)
        .map_err(|e| AppError::Internal(format!("无法访问模型文件 {path:?}: {e}")))?;
    if !meta.is_file() {
        return Err(AppError::Internal(format!("模型路径不是文件: {path:?}")));
    }
    tracing::info!(
        "✅ 模型文件已就绪: {:?} ({:.1} MiB)",
        path,
        meta.len() as f64 / (1024.0 * 1024.0)
    );
    Ok(())
}
