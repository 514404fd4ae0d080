use image::imageops;
use image::{Rgb, RgbImage};
use ndarray::{Array3, Axis, concatenate};

use super::lab::{L_RANGE, lab_to_rgb};
use super::preprocess::RESAMPLE_FILTER;
use super::tensor::{AB_SCALE, L_SCALE, NormalizedLightness, OriginalSize, PredictedChroma};
use crate::error::ColorizeError;

/// 将原始亮度与预测色度合成为原尺寸的 RGB 图片。
///
/// 1. `L = clip(L_norm * 50 + 50, 0, 100)`
/// 2. `ab = ab_pred * 110`（不截断，越界值交给色彩转换处理）
/// 3. 拼装 `[L, a, b]`，必须恰好 3 通道且空间尺寸与 L 一致
/// 4. Lab → RGB，截断到 [0, 1] 后量化到 8 位
/// 5. 双三次插值缩放回原始尺寸
pub fn postprocess(
    lightness: &NormalizedLightness,
    chroma: &PredictedChroma,
    original_size: OriginalSize,
) -> Result<RgbImage, ColorizeError> {
    let lab = assemble_lab(lightness, chroma)?;
    let rgb = lab_to_rgb_image(&lab);

    if rgb.dimensions() == (original_size.width, original_size.height) {
        return Ok(rgb);
    }
    Ok(imageops::resize(
        &rgb,
        original_size.width,
        original_size.height,
        RESAMPLE_FILTER,
    ))
}

/// 反归一化并拼装 channel-first Lab 缓冲 `[3, H, W]`
pub fn assemble_lab(
    lightness: &NormalizedLightness,
    chroma: &PredictedChroma,
) -> Result<Array3<f32>, ColorizeError> {
    let l = lightness
        .view()
        .mapv(|v| (v * L_SCALE + L_SCALE).clamp(L_RANGE.0, L_RANGE.1));
    let ab = chroma.view().mapv(|v| v * AB_SCALE);

    let l_shape = l.shape();
    let ab_shape = ab.shape();
    if ab_shape[1..] != l_shape[1..] {
        return Err(ColorizeError::Shape {
            context: "预测色度的空间尺寸必须与亮度一致",
            shape: ab_shape.to_vec(),
        });
    }

    let lab = concatenate(Axis(0), &[l.view(), ab.view()]).map_err(|_| ColorizeError::Shape {
        context: "无法拼装 Lab 缓冲",
        shape: ab_shape.to_vec(),
    })?;

    if lab.shape()[0] != 3 {
        return Err(ColorizeError::Shape {
            context: "Lab 缓冲应为 (3, H, W)",
            shape: lab.shape().to_vec(),
        });
    }
    Ok(lab)
}

/// `[3, H, W]` Lab → 8 位 RGB 图片（截断量化）
fn lab_to_rgb_image(lab: &Array3<f32>) -> RgbImage {
    let (h, w) = (lab.shape()[1], lab.shape()[2]);
    RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let rgb = lab_to_rgb([lab[[0, y, x]], lab[[1, y, x]], lab[[2, y, x]]]);
        Rgb(rgb.map(|c| (c * 255.0) as u8))
    })
}
