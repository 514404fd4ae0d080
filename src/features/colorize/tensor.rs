//! 流水线各阶段之间传递的张量类型。
//!
//! 所有张量均为 channel-first 布局（`[C, H, W]`），元素类型 `f32`；
//! 形状在构造时校验，阶段之间不再假设。

use ndarray::{Array3, Array4, ArrayD, ArrayView3, Axis, Ix3};

use crate::error::ColorizeError;

/// 模型固定输入边长
pub const MODEL_INPUT_SIZE: u32 = 256;

/// L 通道归一化尺度：`L/50 - 1` 将 [0,100] 映射到 [-1,1]
pub const L_SCALE: f32 = 50.0;

/// ab 通道归一化尺度：`ab/110` 将约 [-110,110] 映射到 [-1,1]
pub const AB_SCALE: f32 = 110.0;

const SIDE: usize = MODEL_INPUT_SIZE as usize;

/// 原始图片尺寸，解码后、缩放前记录，用于恢复输出几何
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginalSize {
    pub width: u32,
    pub height: u32,
}

impl OriginalSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<(u32, u32)> for OriginalSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// 归一化亮度：`f32[1, 256, 256]`，取值 [-1, 1]
#[derive(Debug, Clone)]
pub struct NormalizedLightness(Array3<f32>);

impl NormalizedLightness {
    /// 校验形状后构造
    pub fn new(data: Array3<f32>) -> Result<Self, ColorizeError> {
        if data.shape() != [1, SIDE, SIDE] {
            return Err(ColorizeError::Shape {
                context: "归一化亮度应为 [1, 256, 256]",
                shape: data.shape().to_vec(),
            });
        }
        Ok(Self(data))
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.0.view()
    }

    /// 增加 batch 维，得到推理接口需要的 `[1, 1, 256, 256]`
    pub fn batched(&self) -> Array4<f32> {
        self.0.clone().insert_axis(Axis(0))
    }
}

/// 归一化色度：`f32[2, 256, 256]`，取值约 [-1, 1]
///
/// 只用于诊断与回环校验，不会送入网络。
#[derive(Debug, Clone)]
pub struct NormalizedChroma(Array3<f32>);

impl NormalizedChroma {
    pub fn new(data: Array3<f32>) -> Result<Self, ColorizeError> {
        if data.shape() != [2, SIDE, SIDE] {
            return Err(ColorizeError::Shape {
                context: "归一化色度应为 [2, 256, 256]",
                shape: data.shape().to_vec(),
            });
        }
        Ok(Self(data))
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.0.view()
    }
}

/// 模型预测的色度：`f32[C, H, W]`。
///
/// 数值范围与通道数都不可信，通道数在后处理拼装 Lab 时校验。
#[derive(Debug, Clone)]
pub struct PredictedChroma(Array3<f32>);

impl PredictedChroma {
    pub fn new(data: Array3<f32>) -> Self {
        Self(data)
    }

    /// 从推理后端的动态输出构造，接受 `[1, C, H, W]` 或 `[C, H, W]`
    pub fn from_dyn(data: ArrayD<f32>) -> Result<Self, ColorizeError> {
        let shape = data.shape().to_vec();
        let squeezed = match shape.len() {
            4 if shape[0] == 1 => data.index_axis_move(Axis(0), 0),
            3 => data,
            _ => {
                return Err(ColorizeError::Shape {
                    context: "预测色度应为 [1, C, H, W] 或 [C, H, W]",
                    shape,
                });
            }
        };
        let arr = squeezed
            .into_dimensionality::<Ix3>()
            .map_err(|_| ColorizeError::Shape {
                context: "预测色度无法转换为三维张量",
                shape: shape.clone(),
            })?;
        Ok(Self(arr))
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.0.view()
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }
}

impl From<NormalizedChroma> for PredictedChroma {
    fn from(value: NormalizedChroma) -> Self {
        Self(value.0)
    }
}
