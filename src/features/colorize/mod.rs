//! 着色流水线：解码 → 预处理 → 推理 → 后处理 → 编码。

pub mod codec;
pub mod handler;
pub mod inference;
pub mod lab;
pub mod pipeline;
pub mod postprocess;
pub mod preprocess;
pub mod tensor;

pub use crate::error::ColorizeError;
pub use handler::create_colorize_router;
pub use inference::{Colorizer, NeutralColorizer, load_colorizer};
pub use pipeline::{ColorizeOutcome, PipelineOptions, colorize_bytes};
