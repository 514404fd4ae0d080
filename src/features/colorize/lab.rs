//! sRGB ↔ CIE Lab 转换（D65 白点，2° 观察者）。
//!
//! 常量与分段阈值与 scikit-image 的 `rgb2lab` / `lab2rgb` 一致，
//! 保证与模型训练期的预处理数值对齐。内部以 `f64` 计算。

/// D65 参考白（2° 观察者）
const WHITE_D65: [f64; 3] = [0.95047, 1.0, 1.08883];

/// 线性 sRGB → XYZ
const XYZ_FROM_RGB: [[f64; 3]; 3] = [
    [0.412453, 0.357580, 0.180423],
    [0.212671, 0.715160, 0.072169],
    [0.019334, 0.119193, 0.950227],
];

/// XYZ → 线性 sRGB（`XYZ_FROM_RGB` 的逆矩阵）
const RGB_FROM_XYZ: [[f64; 3]; 3] = [
    [3.240_481_34, -1.537_151_52, -0.498_536_33],
    [-0.969_254_95, 1.875_990_00, 0.041_555_93],
    [0.055_646_64, -0.204_041_34, 1.057_311_07],
];

const LAB_EPSILON: f64 = 0.008856;
const LAB_KAPPA_SLOPE: f64 = 7.787;
const LAB_OFFSET: f64 = 16.0 / 116.0;
/// `LAB_EPSILON` 的立方根，反变换的分段阈值
const LAB_INV_THRESHOLD: f64 = 0.2068966;

/// L 通道合法范围
pub const L_RANGE: (f32, f32) = (0.0, 100.0);

fn mat_mul(m: &[[f64; 3]; 3], v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn srgb_to_linear(c: f64) -> f64 {
    if c > 0.04045 {
        ((c + 0.055) / 1.055).powf(2.4)
    } else {
        c / 12.92
    }
}

fn linear_to_srgb(c: f64) -> f64 {
    if c > 0.0031308 {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    } else {
        c * 12.92
    }
}

fn lab_f(t: f64) -> f64 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        LAB_KAPPA_SLOPE * t + LAB_OFFSET
    }
}

fn lab_f_inv(t: f64) -> f64 {
    if t > LAB_INV_THRESHOLD {
        t * t * t
    } else {
        (t - LAB_OFFSET) / LAB_KAPPA_SLOPE
    }
}

/// 8 位 sRGB 像素 → `[L, a, b]`
pub fn rgb_to_lab(rgb: [u8; 3]) -> [f32; 3] {
    let linear = rgb.map(|c| srgb_to_linear(f64::from(c) / 255.0));
    let xyz = mat_mul(&XYZ_FROM_RGB, linear);

    let fx = lab_f(xyz[0] / WHITE_D65[0]);
    let fy = lab_f(xyz[1] / WHITE_D65[1]);
    let fz = lab_f(xyz[2] / WHITE_D65[2]);

    let l = 116.0 * fy - 16.0;
    let a = 500.0 * (fx - fy);
    let b = 200.0 * (fy - fz);
    [l as f32, a as f32, b as f32]
}

/// `[L, a, b]` → sRGB，各通道已截断到 [0, 1]。
///
/// 超出色域的 Lab 会得到越界的 RGB，这里统一截断；
/// Z 分量为负时按 0 处理。非有限输入按 0 处理。
pub fn lab_to_rgb(lab: [f32; 3]) -> [f32; 3] {
    let [l, a, b] = lab.map(|v| if v.is_finite() { f64::from(v) } else { 0.0 });

    let fy = (l + 16.0) / 116.0;
    let fx = a / 500.0 + fy;
    let fz = (fy - b / 200.0).max(0.0);

    let xyz = [
        lab_f_inv(fx) * WHITE_D65[0],
        lab_f_inv(fy) * WHITE_D65[1],
        lab_f_inv(fz) * WHITE_D65[2],
    ];

    mat_mul(&RGB_FROM_XYZ, xyz).map(|c| {
        let v = linear_to_srgb(c);
        if v.is_finite() {
            v.clamp(0.0, 1.0) as f32
        } else {
            0.0
        }
    })
}

/// 清理单个 Lab 像素：非有限值替换为中性值，L 截断到 [0, 100]
pub fn sanitize_lab(lab: [f32; 3]) -> [f32; 3] {
    let [l, a, b] = lab;
    let l = if l.is_nan() {
        L_RANGE.0
    } else {
        l.clamp(L_RANGE.0, L_RANGE.1)
    };
    let chroma = |v: f32| {
        if v.is_nan() {
            0.0
        } else if v.is_infinite() {
            v.signum() * super::tensor::AB_SCALE
        } else {
            v
        }
    };
    [l, chroma(a), chroma(b)]
}
