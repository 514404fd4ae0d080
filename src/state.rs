use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::{AppConfig, OutputKind};
use crate::features::colorize::codec::OutputFormat;
use crate::features::colorize::inference::Colorizer;
use crate::features::colorize::pipeline::PipelineOptions;

/// 聚合的应用共享状态（启动时构建一次，之后只读）
#[derive(Clone)]
pub struct AppState {
    /// 已加载的推理后端
    pub colorizer: Arc<dyn Colorizer>,
    /// 每次请求共用的流水线参数
    pub pipeline: PipelineOptions,
    /// 控制并发着色任务数量的信号量（CPU/内存密集）
    pub inference_semaphore: Arc<Semaphore>,
    /// 信号量初始许可数（用于退出时等待任务排空）
    pub max_parallel: usize,
}

impl AppState {
    pub fn new(
        colorizer: Arc<dyn Colorizer>,
        pipeline: PipelineOptions,
        max_parallel: usize,
    ) -> Self {
        let max_parallel = max_parallel.max(1);
        Self {
            colorizer,
            pipeline,
            inference_semaphore: Arc::new(Semaphore::new(max_parallel)),
            max_parallel,
        }
    }

    /// 按配置构建状态
    pub fn from_config(colorizer: Arc<dyn Colorizer>, config: &AppConfig) -> Self {
        let pipeline = PipelineOptions {
            max_dimension: config.upload.max_dimension,
            output: match config.output.format {
                OutputKind::Jpeg => OutputFormat::Jpeg {
                    quality: config.output.jpeg_quality,
                },
                OutputKind::Png => OutputFormat::Png,
            },
        };
        Self::new(colorizer, pipeline, config.inference.effective_parallelism())
    }
}
