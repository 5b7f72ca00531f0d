//! 体素坐标到世界坐标的仿射变换.

use nifti::NiftiHeader;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 4x4 仿射矩阵, 将 nifti 体素索引 `(x, y, z, 1)` 映射到世界坐标 (毫米).
///
/// 该矩阵是只读的. 它只用于推断方向和计算体素体积.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Affine([[f64; 4]; 4]);

impl Default for Affine {
    #[inline]
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    /// 单位矩阵.
    pub const fn identity() -> Self {
        Self([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// 由行优先的 4x4 矩阵直接构造. 最后一行应当为 `[0, 0, 0, 1]`.
    #[inline]
    pub const fn from_rows(rows: [[f64; 4]; 4]) -> Self {
        Self(rows)
    }

    /// 由 nifti 间距构造对角仿射矩阵. `zooms` 按 nifti `(x, y, z)` 顺序给出.
    pub fn from_zooms([x, y, z]: [f64; 3]) -> Self {
        Self([
            [x, 0.0, 0.0, 0.0],
            [0.0, y, 0.0, 0.0],
            [0.0, 0.0, z, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// 从 nifti header 读取仿射矩阵.
    ///
    /// 优先使用 sform (`sform_code > 0`), 其次使用 qform 四元数 (`qform_code > 0`),
    /// 都不存在时退化为以 pixdim 为对角线的矩阵.
    pub fn from_header(h: &NiftiHeader) -> Self {
        if h.sform_code > 0 {
            let row = |r: &[f32; 4]| r.map(|v| v as f64);
            Self([
                row(&h.srow_x),
                row(&h.srow_y),
                row(&h.srow_z),
                [0.0, 0.0, 0.0, 1.0],
            ])
        } else if h.qform_code > 0 {
            Self::from_qform(h)
        } else {
            let [_, x, y, z, ..] = h.pixdim;
            Self::from_zooms([x as f64, y as f64, z as f64])
        }
    }

    /// 由 qform 四元数, 体素间距和 `qfac` 构造仿射矩阵.
    fn from_qform(h: &NiftiHeader) -> Self {
        let (b, c, d) = (h.quatern_b as f64, h.quatern_c as f64, h.quatern_d as f64);
        // 浮点误差可能使 1 - (b² + c² + d²) 略小于 0.
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let rot = [
            [
                a * a + b * b - c * c - d * d,
                2.0 * (b * c - a * d),
                2.0 * (b * d + a * c),
            ],
            [
                2.0 * (b * c + a * d),
                a * a + c * c - b * b - d * d,
                2.0 * (c * d - a * b),
            ],
            [
                2.0 * (b * d - a * c),
                2.0 * (c * d + a * b),
                a * a + d * d - c * c - b * b,
            ],
        ];
        let qfac = if h.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let zooms = [
            h.pixdim[1] as f64,
            h.pixdim[2] as f64,
            h.pixdim[3] as f64 * qfac,
        ];
        let offset = [h.quatern_x as f64, h.quatern_y as f64, h.quatern_z as f64];

        let mut m = Self::identity().0;
        for r in 0..3 {
            for c in 0..3 {
                m[r][c] = rot[r][c] * zooms[c];
            }
            m[r][3] = offset[r];
        }
        Self(m)
    }

    /// 将该矩阵作为 sform 写入 `h`, 同时按列范数更新 pixdim.
    ///
    /// qform 会被清除, 以免两者不一致.
    pub fn write_to(&self, h: &mut NiftiHeader) {
        let row = |r: &[f64; 4]| r.map(|v| v as f32);
        h.srow_x = row(&self.0[0]);
        h.srow_y = row(&self.0[1]);
        h.srow_z = row(&self.0[2]);
        h.sform_code = 2;
        h.qform_code = 0;
        h.pixdim[0] = 1.0;
        for (i, z) in self.column_norms().into_iter().enumerate() {
            h.pixdim[i + 1] = z as f32;
        }
    }

    /// 获取行优先的 4x4 矩阵.
    #[inline]
    pub fn rows(&self) -> &[[f64; 4]; 4] {
        &self.0
    }

    /// 获取左上角 3x3 (旋转, 缩放, 剪切) 部分.
    #[inline]
    pub fn rzs(&self) -> [[f64; 3]; 3] {
        let m = &self.0;
        [
            [m[0][0], m[0][1], m[0][2]],
            [m[1][0], m[1][1], m[1][2]],
            [m[2][0], m[2][1], m[2][2]],
        ]
    }

    /// 获取平移部分.
    #[inline]
    pub fn translation(&self) -> [f64; 3] {
        [self.0[0][3], self.0[1][3], self.0[2][3]]
    }

    /// 3x3 部分各列的欧氏范数, 即各 nifti 轴的体素间距.
    pub fn column_norms(&self) -> [f64; 3] {
        let m = self.rzs();
        [0, 1, 2].map(|c| (0..3).map(|r| m[r][c] * m[r][c]).sum::<f64>().sqrt())
    }

    /// 行列式. 最后一行为 `[0, 0, 0, 1]` 时等于 3x3 部分的行列式.
    pub fn determinant(&self) -> f64 {
        let m = self.rzs();
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// 单个体素的物理体积, 以立方毫米为单位.
    #[inline]
    pub fn voxel_volume(&self) -> f64 {
        self.determinant().abs()
    }
}
