use std::time::{Duration, Instant};

use super::codec::{self, OutputFormat};
use super::inference::Colorizer;
use super::postprocess::postprocess;
use super::preprocess::preprocess;
use super::tensor::OriginalSize;
use crate::error::ColorizeError;

/// 单次着色流程的参数
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// 解码时允许的最大单边像素数
    pub max_dimension: u32,
    /// 输出容器格式
    pub output: OutputFormat,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_dimension: 8192,
            output: OutputFormat::default(),
        }
    }
}

/// 各阶段耗时
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
    pub decode: Duration,
    pub preprocess: Duration,
    pub inference: Duration,
    pub postprocess: Duration,
    pub encode: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.decode + self.preprocess + self.inference + self.postprocess + self.encode
    }
}

/// 着色结果
#[derive(Debug, Clone)]
pub struct ColorizeOutcome {
    /// 编码后的图片字节
    pub bytes: Vec<u8>,
    /// 输出尺寸（等于输入尺寸）
    pub original_size: OriginalSize,
    pub timings: StageTimings,
}

/// 同步执行完整流程：解码 → 预处理 → 推理 → 后处理 → 编码。
///
/// 任一阶段失败立即返回，不重试。CPU 密集，调用方需放到阻塞线程池执行。
pub fn colorize_bytes(
    colorizer: &dyn Colorizer,
    bytes: &[u8],
    options: &PipelineOptions,
) -> Result<ColorizeOutcome, ColorizeError> {
    let mut timings = StageTimings::default();

    let t = Instant::now();
    let rgb = codec::decode(bytes, options.max_dimension)?;
    timings.decode = t.elapsed();

    let t = Instant::now();
    let pre = preprocess(&rgb)?;
    drop(rgb);
    timings.preprocess = t.elapsed();

    let t = Instant::now();
    let chroma = colorizer.infer(&pre.lightness)?;
    timings.inference = t.elapsed();

    // 后处理使用原始亮度，而非网络可能改写过的版本
    let t = Instant::now();
    let colorized = postprocess(&pre.lightness, &chroma, pre.original_size)?;
    timings.postprocess = t.elapsed();

    let t = Instant::now();
    let encoded = codec::encode(&colorized, options.output)?;
    timings.encode = t.elapsed();

    Ok(ColorizeOutcome {
        bytes: encoded,
        original_size: pre.original_size,
        timings,
    })
}
