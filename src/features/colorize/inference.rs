//! 推理后端：由归一化亮度预测色度。
//!
//! 网络本身是外部协作者，这里只约定接口：
//! 输入 `[1, 1, 256, 256]` 的 L，输出 `[1, 2, 256, 256]` 的 ab。
//! 调用是同步且可能较慢的（受限硬件上可达数秒），不做重试与超时。

use std::sync::Arc;

use ndarray::Array3;

use super::tensor::{MODEL_INPUT_SIZE, NormalizedLightness, PredictedChroma};
use crate::config::{ModelBackend, ModelConfig};
use crate::error::InferenceError;

/// 着色推理接口。
///
/// 实现需要支持多个请求并发调用（只读共享）。
pub trait Colorizer: Send + Sync {
    /// 后端名称（用于日志与健康检查）
    fn backend_name(&self) -> &'static str;

    /// 预测色度；错误原样向上传播
    fn infer(&self, lightness: &NormalizedLightness) -> Result<PredictedChroma, InferenceError>;
}

/// 中性后端：始终预测零色度，输出即输入的灰度版本。
#[derive(Debug, Default, Clone, Copy)]
pub struct NeutralColorizer;

impl Colorizer for NeutralColorizer {
    fn backend_name(&self) -> &'static str {
        "neutral"
    }

    fn infer(&self, lightness: &NormalizedLightness) -> Result<PredictedChroma, InferenceError> {
        let shape = lightness.view().shape().to_vec();
        Ok(PredictedChroma::new(Array3::zeros((2, shape[1], shape[2]))))
    }
}

/// 按配置加载推理后端（启动期调用一次，可能较慢）
pub fn load_colorizer(config: &ModelConfig) -> Result<Arc<dyn Colorizer>, InferenceError> {
    match config.backend {
        ModelBackend::Neutral => {
            tracing::warn!("使用 neutral 推理后端：输出将保持灰度");
            Ok(Arc::new(NeutralColorizer))
        }
        ModelBackend::Onnx => load_onnx(config),
    }
}

#[cfg(feature = "onnx")]
fn load_onnx(config: &ModelConfig) -> Result<Arc<dyn Colorizer>, InferenceError> {
    Ok(Arc::new(onnx::OnnxColorizer::load(config)?))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx(_config: &ModelConfig) -> Result<Arc<dyn Colorizer>, InferenceError> {
    Err(InferenceError::Unavailable(
        "当前构建未启用 `onnx` feature，请使用 --features onnx 重新构建或将 model.backend 设为 neutral"
            .to_string(),
    ))
}

#[cfg(feature = "onnx")]
pub mod onnx {
    use std::sync::Mutex;

    use ort::session::Session;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::value::Tensor;

    use super::*;

    /// ONNX Runtime 生成器后端。
    ///
    /// `Session::run` 需要独占访问，会话放在互斥锁内；
    /// 并发度由上层信号量控制。
    pub struct OnnxColorizer {
        session: Mutex<Session>,
        input_name: String,
        output_name: String,
    }

    impl OnnxColorizer {
        pub fn load(config: &ModelConfig) -> Result<Self, InferenceError> {
            let path = config.model_path();
            let load_err = |e: ort::Error| InferenceError::Load(format!("{}: {e}", path.display()));

            let mut builder = Session::builder()
                .map_err(load_err)?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(load_err)?;
            if config.intra_threads > 0 {
                builder = builder
                    .with_intra_threads(config.intra_threads)
                    .map_err(load_err)?;
            }
            let session = builder.commit_from_file(&path).map_err(load_err)?;

            let input_name = match &config.input_name {
                Some(name) => name.clone(),
                None => session
                    .inputs
                    .first()
                    .map(|i| i.name.clone())
                    .ok_or_else(|| InferenceError::Load("模型没有输入".to_string()))?,
            };
            let output_name = match &config.output_name {
                Some(name) => name.clone(),
                None => session
                    .outputs
                    .first()
                    .map(|o| o.name.clone())
                    .ok_or_else(|| InferenceError::Load("模型没有输出".to_string()))?,
            };

            tracing::info!(
                "ONNX 模型加载完成: {:?} (input={}, output={}, side={})",
                path,
                input_name,
                output_name,
                MODEL_INPUT_SIZE
            );

            Ok(Self {
                session: Mutex::new(session),
                input_name,
                output_name,
            })
        }
    }

    impl Colorizer for OnnxColorizer {
        fn backend_name(&self) -> &'static str {
            "onnx"
        }

        fn infer(
            &self,
            lightness: &NormalizedLightness,
        ) -> Result<PredictedChroma, InferenceError> {
            let input = Tensor::from_array(lightness.batched())
                .map_err(|e| InferenceError::Run(format!("构造输入张量失败: {e}")))?;

            let output = {
                let mut session = self
                    .session
                    .lock()
                    .map_err(|_| InferenceError::Run("推理会话锁已中毒".to_string()))?;
                let outputs = session
                    .run(ort::inputs![self.input_name.as_str() => input])
                    .map_err(|e| InferenceError::Run(e.to_string()))?;
                let view = outputs[self.output_name.as_str()]
                    .try_extract_array::<f32>()
                    .map_err(|e| InferenceError::InvalidOutput(e.to_string()))?;
                view.to_owned()
            };

            PredictedChroma::from_dyn(output)
                .map_err(|e| InferenceError::InvalidOutput(e.to_string()))
        }
    }
}
