use image::RgbImage;
use image::imageops::{self, FilterType};
use ndarray::{Array3, s};

use super::lab::{rgb_to_lab, sanitize_lab};
use super::tensor::{
    AB_SCALE, L_SCALE, MODEL_INPUT_SIZE, NormalizedChroma, NormalizedLightness, OriginalSize,
};
use crate::error::ColorizeError;

/// 缩放使用的插值核。
///
/// Catmull-Rom 即 a=-0.5 的双三次核，与训练期预处理（PIL BICUBIC）一致；
/// 不能换成最近邻或双线性，否则模型输出质量明显下降。
pub(crate) const RESAMPLE_FILTER: FilterType = FilterType::CatmullRom;

/// 预处理结果
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// 归一化亮度 `[1, 256, 256]`
    pub lightness: NormalizedLightness,
    /// 归一化色度 `[2, 256, 256]`（仅用于诊断/回环）
    pub chroma: NormalizedChroma,
    /// 缩放前的原始尺寸
    pub original_size: OriginalSize,
}

/// 将解码后的 RGB 图片转换为模型输入张量
pub fn preprocess(image: &RgbImage) -> Result<Preprocessed, ColorizeError> {
    let original_size = OriginalSize::from(image.dimensions());

    let side = MODEL_INPUT_SIZE;
    let resized = imageops::resize(image, side, side, RESAMPLE_FILTER);

    let lab = rgb_image_to_lab(&resized);
    let lightness = lab.slice(s![0..1, .., ..]).mapv(|l| l / L_SCALE - 1.0);
    let chroma = lab.slice(s![1..3, .., ..]).mapv(|ab| ab / AB_SCALE);

    Ok(Preprocessed {
        lightness: NormalizedLightness::new(lightness)?,
        chroma: NormalizedChroma::new(chroma)?,
        original_size,
    })
}

/// RGB 图片 → channel-first Lab 缓冲 `[3, H, W]`
fn rgb_image_to_lab(image: &RgbImage) -> Array3<f32> {
    let (w, h) = image.dimensions();
    let mut lab = Array3::<f32>::zeros((3, h as usize, w as usize));
    for (x, y, px) in image.enumerate_pixels() {
        let [l, a, b] = sanitize_lab(rgb_to_lab(px.0));
        let (x, y) = (x as usize, y as usize);
        lab[[0, y, x]] = l;
        lab[[1, y, x]] = a;
        lab[[2, y, x]] = b;
    }
    lab
}
