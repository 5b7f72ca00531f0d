//! 体数据方向推断与方向变换.
//!
//! 方向 ([`Ornt`]) 描述 nifti 的每个体素轴 (0 = x, 1 = y, 2 = z)
//! 对应哪个世界坐标轴 (0 = L→R, 1 = P→A, 2 = I→S), 以及是否反向.
//!
//! # 注意
//!
//! 所有操作的语义都以 nifti 轴顺序定义. 数组在内存中按 `(z, y, x)` 排列,
//! 该模块内部负责转换, 调用者无需关心.

use crate::linalg::polar_factor_truncated;
use crate::{Affine, MriError, MriResult};
use ndarray::{Array2, Array3, ArrayView3, Axis};
use ordered_float::OrderedFloat;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 判断列向量是否为零的绝对容差.
const ZERO_ATOL: f64 = 1e-8;

/// 单个输入轴的方向.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AxisOrient {
    /// 对应的输出轴.
    pub axis: usize,

    /// 是否反向.
    pub flipped: bool,
}

impl AxisOrient {
    /// 构造单轴方向.
    #[inline]
    pub const fn new(axis: usize, flipped: bool) -> Self {
        Self { axis, flipped }
    }
}

/// 三维方向. 第 `i` 项描述 nifti 第 `i` 个轴.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ornt([AxisOrient; 3]);

impl Default for Ornt {
    #[inline]
    fn default() -> Self {
        Self::identity()
    }
}

impl Ornt {
    /// 由三个单轴方向构造.
    #[inline]
    pub const fn new(axes: [AxisOrient; 3]) -> Self {
        Self(axes)
    }

    /// 恒等方向 (RAS+).
    pub const fn identity() -> Self {
        Self([
            AxisOrient::new(0, false),
            AxisOrient::new(1, false),
            AxisOrient::new(2, false),
        ])
    }

    /// 各轴方向.
    #[inline]
    pub fn axes(&self) -> &[AxisOrient; 3] {
        &self.0
    }

    /// 是否为恒等方向?
    #[inline]
    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// 若 `self` 为方向变换, 则返回其逆变换.
    pub fn inverse(&self) -> Self {
        let mut ans = Self::identity().0;
        for (i, o) in self.0.iter().enumerate() {
            ans[o.axis] = AxisOrient::new(i, o.flipped);
        }
        Self(ans)
    }

    /// 各轴正方向所指向的解剖学方位字母, 例如 `['R', 'A', 'S']`.
    pub fn axcodes(&self) -> [char; 3] {
        const LABELS: [(char, char); 3] = [('L', 'R'), ('P', 'A'), ('I', 'S')];
        self.0.map(|o| {
            let (neg, pos) = LABELS[o.axis];
            if o.flipped {
                neg
            } else {
                pos
            }
        })
    }
}

/// 由仿射矩阵推断各体素轴的方向.
///
/// 先将 3x3 部分的各列归一化 (零列视为范数 1), 再取极分解因子去掉剪切,
/// 然后按输入轴顺序依次贪心地为每个轴选择绝对值最大的输出轴,
/// 并将已选中的输出轴所在行清零. 绝对值相同时取编号最小的输出轴.
///
/// # 返回值
///
/// 若某个轴 (列) 在去掉已选中的行后全为零, 则返回 `Err`.
pub fn io_orientation(affine: &Affine) -> MriResult<Ornt> {
    let rzs = affine.rzs();
    let zooms = affine.column_norms().map(|z| if z == 0.0 { 1.0 } else { z });
    let rs = Array2::from_shape_fn((3, 3), |(r, c)| rzs[r][c] / zooms[c]);
    let mut r = polar_factor_truncated(&rs)?;

    let mut ans = Ornt::identity().0;
    for in_ax in 0..3 {
        let col = r.column(in_ax);
        if col.iter().all(|v| v.abs() <= ZERO_ATOL) {
            return Err(MriError::DegenerateAffine(in_ax));
        }
        // rev + max_by_key: 相同时取第一个.
        let out_ax = (0..3)
            .rev()
            .max_by_key(|&k| OrderedFloat(col[k].abs()))
            .unwrap_or(in_ax);
        ans[in_ax] = AxisOrient::new(out_ax, col[out_ax] < 0.0);
        r.row_mut(out_ax).fill(0.0);
    }
    Ok(Ornt(ans))
}

/// 计算从方向 `start` 到方向 `end` 的变换.
///
/// 对 `start` 的每个轴, 找到 `end` 中指向同一输出轴的轴; 两者反向性不同时需要翻转.
///
/// # 返回值
///
/// 若某个输出轴在 `end` 中存在而 `start` 中不存在 (或反之), 则返回 `Err`.
pub fn ornt_transform(start: &Ornt, end: &Ornt) -> MriResult<Ornt> {
    let mut ans = [None; 3];
    for (end_in, e) in end.0.iter().enumerate() {
        let start_in = start
            .0
            .iter()
            .position(|s| s.axis == e.axis)
            .ok_or(MriError::IncompatibleOrientation)?;
        ans[start_in] = Some(AxisOrient::new(end_in, start.0[start_in].flipped != e.flipped));
    }
    match ans {
        [Some(a), Some(b), Some(c)] => Ok(Ornt([a, b, c])),
        _ => Err(MriError::IncompatibleOrientation),
    }
}

/// 对 `(z, y, x)` 排列的数组施加方向变换 `ornt`.
///
/// 先翻转 `ornt` 中标记反向的 nifti 轴, 再转置使得新的第 `ornt[i].axis`
/// 个 nifti 轴为原来的第 `i` 个轴. 返回的数组仍以 `(z, y, x)` 排列.
pub fn apply_orientation<T: Clone>(data: ArrayView3<T>, ornt: &Ornt) -> Array3<T> {
    // [z, y, x] -> [x, y, z].
    let mut view = data.reversed_axes();
    for (i, o) in ornt.0.iter().enumerate() {
        if o.flipped {
            view.invert_axis(Axis(i));
        }
    }
    let mut perm = [0usize; 3];
    for (i, o) in ornt.0.iter().enumerate() {
        perm[o.axis] = i;
    }
    view.permuted_axes(perm).reversed_axes().as_standard_layout().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_diagonal_affine() {
        let o = io_orientation(&Affine::from_zooms([2.0, 3.0, 4.0])).unwrap();
        assert!(o.is_identity());
        assert_eq!(o.axcodes(), ['R', 'A', 'S']);

        let o = io_orientation(&Affine::from_zooms([-1.0, 1.0, 1.0])).unwrap();
        assert_eq!(
            o,
            Ornt::new([
                AxisOrient::new(0, true),
                AxisOrient::new(1, false),
                AxisOrient::new(2, false),
            ])
        );
        assert_eq!(o.axcodes(), ['L', 'A', 'S']);
    }

    #[test]
    fn test_permuted_affine() {
        let a = Affine::from_rows([
            [0.0, 0.0, 2.0, 0.0],
            [0.0, -3.0, 0.0, 0.0],
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let o = io_orientation(&a).unwrap();
        assert_eq!(
            o,
            Ornt::new([
                AxisOrient::new(2, false),
                AxisOrient::new(1, true),
                AxisOrient::new(0, false),
            ])
        );
        assert_eq!(o.axcodes(), ['S', 'P', 'R']);
    }

    #[test]
    fn test_degenerate_affine() {
        let a = Affine::from_zooms([1.0, 0.0, 1.0]);
        assert!(matches!(
            io_orientation(&a),
            Err(MriError::DegenerateAffine(1))
        ));
    }

    #[test]
    fn test_transform() {
        let start = Ornt::new([
            AxisOrient::new(0, true),
            AxisOrient::new(1, false),
            AxisOrient::new(2, false),
        ]);
        assert!(ornt_transform(&start, &start).unwrap().is_identity());
        assert_eq!(ornt_transform(&Ornt::identity(), &start).unwrap(), start);

        let bad = Ornt::new([
            AxisOrient::new(0, false),
            AxisOrient::new(0, false),
            AxisOrient::new(2, false),
        ]);
        assert!(matches!(
            ornt_transform(&bad, &start),
            Err(MriError::IncompatibleOrientation)
        ));
    }

    /// 翻转 nifti x 轴即翻转内存中的最后一个轴.
    #[test]
    fn test_apply_flip_x() {
        let data = Array3::from_shape_fn((2, 3, 4), |(z, y, x)| z * 100 + y * 10 + x);
        let o = Ornt::new([
            AxisOrient::new(0, true),
            AxisOrient::new(1, false),
            AxisOrient::new(2, false),
        ]);
        let out = apply_orientation(data.view(), &o);
        assert_eq!(out.dim(), (2, 3, 4));
        assert_eq!(out[(1, 2, 0)], data[(1, 2, 3)]);
        assert_eq!(out[(0, 0, 3)], data[(0, 0, 0)]);
    }

    /// nifti x, z 轴互换, 内存形状随之变化.
    #[test]
    fn test_apply_swap() {
        let data = Array3::from_shape_fn((2, 3, 4), |(z, y, x)| z * 100 + y * 10 + x);
        let o = Ornt::new([
            AxisOrient::new(2, false),
            AxisOrient::new(1, false),
            AxisOrient::new(0, false),
        ]);
        let out = apply_orientation(data.view(), &o);
        assert_eq!(out.dim(), (4, 3, 2));
        assert_eq!(out[(3, 1, 0)], data[(0, 1, 3)]);
    }

    #[test]
    fn test_apply_then_inverse() {
        let data = Array3::from_shape_fn((3, 4, 5), |(z, y, x)| (z * 20 + y * 5 + x) as f32);
        let start = io_orientation(&Affine::from_rows([
            [0.0, 0.0, -2.0, 0.0],
            [1.0, 0.0, 0.0, 0.0],
            [0.0, -1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]))
        .unwrap();
        let end = crate::consts::TISSUE_MODEL_FRAME;

        let forward = ornt_transform(&start, &end).unwrap();
        let back = ornt_transform(&end, &start).unwrap();
        assert_eq!(back, forward.inverse());

        let there = apply_orientation(data.view(), &forward);
        assert_eq!(apply_orientation(there.view(), &back), data);
        assert_eq!(apply_orientation(data.view(), &Ornt::identity()), data);
    }
}
