use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ImageReader, Limits, RgbImage};

use crate::error::ColorizeError;

/// 输出图片格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JPEG（默认流程的输出）
    Jpeg { quality: u8 },
    /// PNG（无损，主要用于诊断）
    Png,
}

impl OutputFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg { .. } => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg { .. } => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Jpeg { quality: 75 }
    }
}

/// 解码上传内容为 RGB 像素缓冲。
///
/// 任意输入模式（灰度/调色板/RGBA/16 位）都会转换为 8 位 RGB，alpha 被丢弃。
/// `max_dimension` 限制单边像素数，防止解压炸弹。
pub fn decode(bytes: &[u8], max_dimension: u32) -> Result<RgbImage, ColorizeError> {
    if bytes.is_empty() {
        return Err(ColorizeError::Decode("上传内容为空".to_string()));
    }

    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ColorizeError::Decode(format!("读取图片头失败: {e}")))?;
    if reader.format().is_none() {
        return Err(ColorizeError::Decode("无法识别的图片格式".to_string()));
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(max_dimension);
    limits.max_image_height = Some(max_dimension);
    reader.limits(limits);

    let decoded = reader
        .decode()
        .map_err(|e| ColorizeError::Decode(e.to_string()))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(ColorizeError::Decode(format!(
            "图片尺寸无效: {}x{}",
            decoded.width(),
            decoded.height()
        )));
    }

    Ok(decoded.to_rgb8())
}

/// 将 RGB 像素缓冲编码为指定容器格式
pub fn encode(image: &RgbImage, format: OutputFormat) -> Result<Vec<u8>, ColorizeError> {
    let mut buf = Vec::with_capacity(image.as_raw().len() / 4);
    let written = match format {
        OutputFormat::Jpeg { quality } => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
            image.write_with_encoder(encoder)
        }
        OutputFormat::Png => image.write_with_encoder(PngEncoder::new(&mut buf)),
    };
    written.map_err(|e| ColorizeError::Encode(e.to_string()))?;
    Ok(buf)
}
