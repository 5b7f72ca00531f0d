//! 3D 形态学操作: 连通域标记与最大连通域选择.

use crate::consts::gray::*;
use crate::{BinaryMask, Idx3d};
use ndarray::{Array3, ArrayView3};
use std::collections::VecDeque;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 需要前景时, 掩膜中不存在任何前景体素.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("mask contains no foreground voxel")]
pub struct EmptyMaskError;

/// 三维邻接规则.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Connectivity {
    /// 6-邻接: 仅共面的体素相邻.
    Face,

    /// 26-邻接: 共面, 共棱或共顶点的体素均相邻 (3x3x3 结构元).
    #[default]
    Full,
}

/// 6-邻接偏移.
const FACE_OFFSETS: [[isize; 3]; 6] = [
    [-1, 0, 0],
    [1, 0, 0],
    [0, -1, 0],
    [0, 1, 0],
    [0, 0, -1],
    [0, 0, 1],
];

/// 26-邻接偏移.
const FULL_OFFSETS: [[isize; 3]; 26] = {
    let mut ans = [[0isize; 3]; 26];
    let mut i = 0;
    let mut n = 0;
    while i < 27 {
        let d = [(i / 9) as isize - 1, ((i / 3) % 3) as isize - 1, (i % 3) as isize - 1];
        if !(d[0] == 0 && d[1] == 0 && d[2] == 0) {
            ans[n] = d;
            n += 1;
        }
        i += 1;
    }
    ans
};

impl Connectivity {
    /// 邻居相对偏移, 按 `(z, y, x)` 给出.
    #[inline]
    pub fn offsets(&self) -> &'static [[isize; 3]] {
        match self {
            Connectivity::Face => &FACE_OFFSETS,
            Connectivity::Full => &FULL_OFFSETS,
        }
    }

    /// 获取 `pos` 在 `shape` 范围内的所有邻居.
    pub fn neighbours(&self, (z, y, x): Idx3d, shape: Idx3d) -> impl Iterator<Item = Idx3d> {
        let (nz, ny, nx) = shape;
        self.offsets().iter().filter_map(move |&[dz, dy, dx]| {
            // 越界时 wrapping_add_signed 得到的大数会被下面的检查过滤掉.
            let p = (
                z.wrapping_add_signed(dz),
                y.wrapping_add_signed(dy),
                x.wrapping_add_signed(dx),
            );
            (p.0 < nz && p.1 < ny && p.2 < nx).then_some(p)
        })
    }
}

/// 连通域标记结果. `0` 为背景, 其余正整数为连通域编号.
///
/// 编号按每个连通域在行优先 (z, y, x) 遍历中首次出现的顺序分配, 从 `1` 开始.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    labels: Array3<u32>,
    count: usize,
}

impl LabelMap {
    /// 标记数组.
    #[inline]
    pub fn labels(&self) -> ArrayView3<'_, u32> {
        self.labels.view()
    }

    /// 连通域个数 (不含背景).
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// 各编号的体素个数. 下标即编号, 下标 `0` 为背景体素个数.
    pub fn histogram(&self) -> Vec<usize> {
        let mut hist = vec![0usize; self.count + 1];
        self.labels.iter().for_each(|&l| hist[l as usize] += 1);
        hist
    }

    /// 体素个数最多的连通域编号. 个数相同时取编号最小者.
    ///
    /// 不存在任何连通域时返回 `None`.
    pub fn largest_label(&self) -> Option<u32> {
        let hist = self.histogram();
        let mut best: Option<(u32, usize)> = None;
        for (label, &cnt) in hist.iter().enumerate().skip(1) {
            // 严格大于, 保证平局时编号最小者胜出.
            if best.map_or(true, |(_, c)| cnt > c) {
                best = Some((label as u32, cnt));
            }
        }
        best.map(|(label, _)| label)
    }

    /// 编号为 `label` 的连通域对应的掩膜.
    pub fn mask_of(&self, label: u32) -> BinaryMask {
        BinaryMask::from_predicate(self.labels.view(), |l| l == label)
    }
}

/// 对 `mask` 的前景进行连通域标记. 邻接规则由 `connectivity` 指定.
pub fn label_components(mask: &BinaryMask, connectivity: Connectivity) -> LabelMap {
    let shape = mask.shape();
    let mut labels = Array3::<u32>::zeros(shape);
    let mut count = 0u32;
    let mut bfs_q = VecDeque::with_capacity(64);

    for (pos, &p) in mask.data().indexed_iter() {
        if is_background(p) || labels[pos] != 0 {
            continue;
        }
        count += 1;
        labels[pos] = count;
        bfs_q.push_back(pos);

        // bfs
        while let Some(cur) = bfs_q.pop_front() {
            for neigh in connectivity.neighbours(cur, shape) {
                if is_foreground(mask[neigh]) && labels[neigh] == 0 {
                    labels[neigh] = count;
                    bfs_q.push_back(neigh);
                }
            }
        }
    }
    LabelMap {
        labels,
        count: count as usize,
    }
}

/// 保留 `mask` 中 26-邻接意义下最大的连通域.
///
/// # 返回值
///
/// 新掩膜, 其前景恰为最大连通域. 多个连通域大小相同时, 保留编号最小者
/// (即在行优先遍历中最先出现的连通域). 若 `mask` 为全背景, 则返回 `Err`.
#[inline]
pub fn select_largest_component(mask: &BinaryMask) -> Result<BinaryMask, EmptyMaskError> {
    select_largest_component_with(mask, Connectivity::Full)
}

/// 与 [`select_largest_component`] 相同, 但邻接规则由 `connectivity` 指定.
pub fn select_largest_component_with(
    mask: &BinaryMask,
    connectivity: Connectivity,
) -> Result<BinaryMask, EmptyMaskError> {
    let labels = label_components(mask, connectivity);
    let largest = labels.largest_label().ok_or(EmptyMaskError)?;
    log::debug!(
        "{} component(s) found, keeping #{} with {} voxel(s)",
        labels.count(),
        largest,
        labels.histogram()[largest as usize]
    );
    Ok(labels.mask_of(largest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array3};

    fn cube(mask: &mut Array3<u8>, (z, y, x): Idx3d, len: usize) {
        mask.slice_mut(s![z..z + len, y..y + len, x..x + len]).fill(1);
    }

    /// 2x2x2 方块与 3x3x3 方块沿 z 轴隔开一层. 26-邻接下要互不相邻, 至少需要 6 层.
    fn two_cubes() -> BinaryMask {
        let mut m = Array3::<u8>::zeros((6, 5, 5));
        cube(&mut m, (0, 0, 0), 2);
        cube(&mut m, (3, 2, 2), 3);
        BinaryMask::new(m)
    }

    #[test]
    fn test_offsets() {
        assert_eq!(Connectivity::Face.offsets().len(), 6);
        assert_eq!(Connectivity::Full.offsets().len(), 26);
        assert!(!Connectivity::Full.offsets().contains(&[0, 0, 0]));
        let n: Vec<_> = Connectivity::Full.neighbours((0, 0, 0), (2, 2, 2)).collect();
        assert_eq!(n.len(), 7);
    }

    #[test]
    fn test_largest_of_two_cubes() {
        let m = two_cubes();
        let labels = label_components(&m, Connectivity::Full);
        assert_eq!(labels.count(), 2);
        assert_eq!(labels.histogram(), vec![150 - 8 - 27, 8, 27]);

        let largest = select_largest_component(&m).unwrap();
        assert_eq!(largest.count(), 27);
        let mut expected = Array3::<u8>::zeros((6, 5, 5));
        cube(&mut expected, (3, 2, 2), 3);
        assert_eq!(largest.data(), expected);
    }

    /// 5x5x5 中两个方块只能共顶点: 26-邻接下合并, 6-邻接下分离.
    #[test]
    fn test_corner_touching_cubes() {
        let mut m = Array3::<u8>::zeros((5, 5, 5));
        cube(&mut m, (0, 0, 0), 2);
        cube(&mut m, (2, 2, 2), 3);
        let m = BinaryMask::new(m);
        assert_eq!(select_largest_component(&m).unwrap().count(), 35);

        let largest = select_largest_component_with(&m, Connectivity::Face).unwrap();
        let mut expected = Array3::<u8>::zeros((5, 5, 5));
        cube(&mut expected, (2, 2, 2), 3);
        assert_eq!(largest.data(), expected);
    }

    #[test]
    fn test_empty_mask() {
        let m = BinaryMask::zeros((3, 4, 5));
        assert_eq!(select_largest_component(&m), Err(EmptyMaskError));
        assert_eq!(
            select_largest_component_with(&m, Connectivity::Face),
            Err(EmptyMaskError)
        );
    }

    #[test]
    fn test_subset_and_idempotent() {
        let m = Array3::from_shape_fn((6, 7, 8), |(z, y, x)| {
            u8::from((z * 7 + y * 3 + x * 5) % 4 == 0 || (z < 2 && y < 2))
        });
        let m = BinaryMask::new(m);
        let largest = select_largest_component(&m).unwrap();
        assert!(largest.is_subset_of(&m));

        // 结果恰为一个 26-连通域.
        assert_eq!(label_components(&largest, Connectivity::Full).count(), 1);

        // 不小于任何其他连通域.
        let hist = label_components(&m, Connectivity::Full).histogram();
        assert!(hist.iter().skip(1).all(|&c| c <= largest.count()));

        assert_eq!(select_largest_component(&largest).unwrap(), largest);
    }

    /// 对角相邻的两个体素: 26-邻接下连通, 6-邻接下不连通.
    #[test]
    fn test_diagonal_connectivity() {
        let mut m = Array3::<u8>::zeros((2, 2, 2));
        m[(0, 0, 0)] = 1;
        m[(1, 1, 1)] = 1;
        let m = BinaryMask::new(m);
        assert_eq!(label_components(&m, Connectivity::Full).count(), 1);
        assert_eq!(label_components(&m, Connectivity::Face).count(), 2);
        assert_eq!(select_largest_component(&m).unwrap().count(), 2);
        assert_eq!(
            select_largest_component_with(&m, Connectivity::Face)
                .unwrap()
                .count(),
            1
        );
    }

    /// 两个连通域大小相同时, 行优先遍历中先出现者胜出.
    #[test]
    fn test_tie_lowest_label() {
        let mut m = Array3::<u8>::zeros((1, 1, 5));
        m[(0, 0, 0)] = 1;
        m[(0, 0, 4)] = 1;
        let m = BinaryMask::new(m);
        let labels = label_components(&m, Connectivity::Full);
        assert_eq!(labels.labels()[(0, 0, 0)], 1);
        assert_eq!(labels.labels()[(0, 0, 4)], 2);
        assert_eq!(labels.largest_label(), Some(1));

        let largest = select_largest_component(&m).unwrap();
        assert_eq!(largest[(0, 0, 0)], 1);
        assert_eq!(largest[(0, 0, 4)], 0);
    }
}
