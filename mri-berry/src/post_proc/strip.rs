//! 以扩张后的掩膜去除颅骨 (脑外组织).

use crate::consts::{STRIP_ENLARGE_THRESHOLD, STRIP_SIGMA_BASE, STRIP_TRUNCATE};
use crate::filter::gaussian_filter;
use crate::{BinaryMask, MriError, MriResult, NiftiHeaderAttr, Volume};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 去颅骨参数.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StripSettings {
    /// 各轴 sigma 为 `round(sigma_base / 体素间距) + 1`, 以体素为单位.
    pub sigma_base: f64,

    /// 高斯核截断位置, 以标准差为单位.
    pub truncate: f64,

    /// 平滑后严格大于该值的体素属于扩张后的掩膜.
    pub enlarge_threshold: f32,
}

impl Default for StripSettings {
    fn default() -> Self {
        Self {
            sigma_base: STRIP_SIGMA_BASE,
            truncate: STRIP_TRUNCATE,
            enlarge_threshold: STRIP_ENLARGE_THRESHOLD,
        }
    }
}

impl StripSettings {
    /// 由 nifti `(x, y, z)` 体素间距计算各内存轴 `(z, y, x)` 的 sigma.
    ///
    /// 间距越小 (分辨率越高), sigma 越大, 从而在物理空间上大致等宽.
    /// 取整方式为四舍六入五成双.
    ///
    /// # 返回值
    ///
    /// 若任一间距不是正有限数, 则返回 `Err`.
    pub fn sigmas(&self, zooms: [f64; 3]) -> MriResult<[f64; 3]> {
        if zooms.iter().any(|&z| !(z.is_finite() && z > 0.0)) {
            return Err(MriError::InvalidSpacing(zooms));
        }
        let [x, y, z] = zooms.map(|z| (self.sigma_base / z).round_ties_even() + 1.0);
        Ok([z, y, x])
    }

    /// 平滑 `mask` 并以 `enlarge_threshold` 重新二值化, 得到扩张后的掩膜.
    /// `sigmas` 按内存轴 `(z, y, x)` 给出.
    pub fn enlarge(&self, mask: &BinaryMask, sigmas: [f64; 3]) -> BinaryMask {
        let smoothed = gaussian_filter(mask.to_f32().view(), sigmas, self.truncate);
        let threshold = self.enlarge_threshold;
        BinaryMask::from_predicate(smoothed.view(), |v| v > threshold)
    }

    /// 以 `mask` 扩张后的结果去除 `target` 中的脑外体素.
    ///
    /// 平滑的 sigma 由 `target` 的体素间距决定. 扩张后掩膜以外的体素被置零,
    /// 以内的体素保持原值. 结果沿用 `target` 的 header.
    ///
    /// # 返回值
    ///
    /// 若 `mask` 与 `target` 形状不一致, 或 `target` 体素间距非法, 则返回 `Err`.
    pub fn strip(&self, target: &Volume, mask: &BinaryMask) -> MriResult<Volume> {
        if mask.shape() != target.shape() {
            return Err(MriError::ShapeMismatch {
                expected: target.shape(),
                found: mask.shape(),
            });
        }
        let sigmas = self.sigmas(target.zooms())?;
        log::debug!("strip sigmas (z, y, x): {sigmas:?}");

        let enlarged = self.enlarge(mask, sigmas);
        log::debug!(
            "mask enlarged from {} to {} voxel(s)",
            mask.count(),
            enlarged.count()
        );
        target.masked(&enlarged)
    }
}
