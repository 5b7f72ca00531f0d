//! 可分离三维高斯滤波.
//!
//! 边界按半采样对称 (reflect) 方式延拓: `d c b a | a b c d | d c b a`.
//! 核半径为 `⌊truncate * sigma + 0.5⌋`, 权重归一化使其和为 1.

use ndarray::{Array3, ArrayView3, ArrayViewMut1, Axis};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use ndarray::Zip;
    }
}

/// sigma 不大于该值的轴不做平滑.
const SIGMA_EPS: f64 = 1e-15;

/// 生成一维归一化高斯核, 长度为 `2 * radius + 1`.
///
/// # 注意
///
/// `sigma` 必须为正有限数, 否则行为未定义.
pub fn gaussian_kernel(sigma: f64, truncate: f64) -> Vec<f64> {
    debug_assert!(sigma > 0.0 && sigma.is_finite());
    let radius = kernel_radius(sigma, truncate) as isize;
    let inv = -0.5 / (sigma * sigma);
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|x| (inv * (x * x) as f64).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|w| *w /= sum);
    kernel
}

/// 高斯核半径.
#[inline]
pub fn kernel_radius(sigma: f64, truncate: f64) -> usize {
    (truncate * sigma + 0.5) as usize
}

/// 将越界下标 `i` 按半采样对称方式映射回 `[0, n)`.
#[inline]
pub fn reflect_index(i: isize, n: usize) -> usize {
    debug_assert_ne!(n, 0);
    let period = 2 * n as isize;
    let m = i.rem_euclid(period) as usize;
    if m >= n {
        2 * n - 1 - m
    } else {
        m
    }
}

/// 对一条一维 lane 就地做相关运算. `buf` 为复用的缓冲区.
fn correlate_lane(mut lane: ArrayViewMut1<f32>, kernel: &[f64], buf: &mut Vec<f64>) {
    let n = lane.len();
    let radius = (kernel.len() / 2) as isize;
    buf.clear();
    buf.extend(lane.iter().map(|&v| v as f64));

    for (i, out) in lane.iter_mut().enumerate() {
        let base = i as isize - radius;
        let acc: f64 = kernel
            .iter()
            .enumerate()
            .map(|(j, w)| w * buf[reflect_index(base + j as isize, n)])
            .sum();
        *out = acc as f32;
    }
}

/// 沿 `axis` 做一维高斯平滑.
#[cfg(not(feature = "rayon"))]
fn filter_axis(data: &mut Array3<f32>, axis: usize, kernel: &[f64]) {
    let mut buf = Vec::with_capacity(data.len_of(Axis(axis)));
    data.lanes_mut(Axis(axis))
        .into_iter()
        .for_each(|lane| correlate_lane(lane, kernel, &mut buf));
}

/// 沿 `axis` 做一维高斯平滑. 各 lane 之间互相独立, 借助 `rayon` 并行计算.
#[cfg(feature = "rayon")]
fn filter_axis(data: &mut Array3<f32>, axis: usize, kernel: &[f64]) {
    Zip::from(data.lanes_mut(Axis(axis))).par_for_each(|lane| {
        let mut buf = Vec::with_capacity(lane.len());
        correlate_lane(lane, kernel, &mut buf);
    });
}

/// 三维高斯平滑. `sigmas` 按内存轴 `(z, y, x)` 给出, 以体素为单位.
///
/// 依次沿三个轴做一维平滑. sigma 为 0 的轴保持不变.
/// 开启 `rayon` feature 时, 同一轴上的各 lane 并行计算, 结果与串行一致.
pub fn gaussian_filter(data: ArrayView3<f32>, sigmas: [f64; 3], truncate: f64) -> Array3<f32> {
    let mut out = data.to_owned();
    for (axis, &sigma) in sigmas.iter().enumerate() {
        if sigma <= SIGMA_EPS || out.len_of(Axis(axis)) == 0 {
            continue;
        }
        let kernel = gaussian_kernel(sigma, truncate);
        log::debug!("gaussian axis {axis}: sigma = {sigma}, radius = {}", kernel.len() / 2);
        filter_axis(&mut out, axis, &kernel);
    }
    out
}
