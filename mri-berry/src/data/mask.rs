//! 二值掩膜.

use crate::consts::gray::*;
use crate::Idx3d;
use ndarray::{Array3, ArrayView3, Zip};
use std::ops::Index;

/// 与源体数据同形状的三维二值掩膜, 体素值只有 [`MASK_BACKGROUND`] 和
/// [`MASK_FOREGROUND`] 两种. 按 `(z, y, x)` 存储.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    data: Array3<u8>,
}

impl Index<Idx3d> for BinaryMask {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl BinaryMask {
    /// 由 `(z, y, x)` 数组构造. 所有非零值被规范化为 [`MASK_FOREGROUND`].
    pub fn new(data: Array3<u8>) -> Self {
        let mut data = data;
        data.mapv_inplace(|p| if is_foreground(p) { MASK_FOREGROUND } else { MASK_BACKGROUND });
        Self { data }
    }

    /// 全背景掩膜.
    #[inline]
    pub fn zeros(shape: Idx3d) -> Self {
        Self {
            data: Array3::zeros(shape),
        }
    }

    /// 将满足 `pred` 的体素设置为前景.
    pub fn from_predicate<T: Copy>(data: ArrayView3<T>, pred: impl Fn(T) -> bool) -> Self {
        Self {
            data: data.mapv(|v| u8::from(pred(v))),
        }
    }

    /// 严格大于 `threshold` 的体素为前景. NaN 永远不是前景.
    ///
    /// 该操作是单调的: 提高 `threshold` 不会增加前景体素个数.
    #[inline]
    pub fn from_threshold(data: ArrayView3<f32>, threshold: f64) -> Self {
        Self::from_predicate(data, |v| v as f64 > threshold)
    }

    /// 掩膜形状 `(z, y, x)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, u8> {
        self.data.view()
    }

    /// 前景体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&p| is_foreground(p)).count()
    }

    /// 是否为全背景?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.iter().copied().all(is_background)
    }

    /// 该掩膜的前景是否完全包含于 `other` 的前景?
    ///
    /// 形状不同时返回 `false`.
    pub fn is_subset_of(&self, other: &BinaryMask) -> bool {
        self.shape() == other.shape()
            && Zip::from(&self.data)
                .and(&other.data)
                .all(|&a, &b| is_background(a) || is_foreground(b))
    }

    /// 收集所有前景体素的下标. 结果按行优先存储.
    pub fn foreground_pos(&self) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(pos, &p)| is_foreground(p).then_some(pos))
            .collect()
    }

    /// 转换为 `0.0 / 1.0` 浮点场, 供平滑使用.
    #[inline]
    pub fn to_f32(&self) -> Array3<f32> {
        self.data.mapv(f32::from)
    }
}
