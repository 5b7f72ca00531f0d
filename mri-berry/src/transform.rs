//! 仿射矩阵到刚体变换的转换, 以及 ITK `.tfm` 文本输出.

use crate::consts::{ITK_TFM_MAGIC, RIGID_TFM_SUFFIX};
use crate::linalg::polar_factor;
use crate::{Affine, MriError, MriResult};
use itertools::Itertools;
use ndarray::{s, Array2};
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 刚体变换: 3x3 正交矩阵加平移.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidTransform {
    rotation: [[f64; 3]; 3],
    translation: [f64; 3],
}

impl RigidTransform {
    /// 直接由旋转和平移构造. 不检查 `rotation` 的正交性.
    #[inline]
    pub const fn new(rotation: [[f64; 3]; 3], translation: [f64; 3]) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// 由至少 3 行 4 列的矩阵构造刚体变换.
    ///
    /// 旋转部分为左上角 3x3 块的正交极分解因子 `U·Vᵀ` (去掉缩放和剪切),
    /// 平移部分为前三行的第 4 列.
    pub fn from_matrix(m: &Array2<f64>) -> MriResult<Self> {
        let (rows, cols) = m.dim();
        if rows < 3 || cols < 4 {
            return Err(MriError::MatrixFormat(format!(
                "expected at least 3x4, found {rows}x{cols}"
            )));
        }
        let r = polar_factor(&m.slice(s![..3, ..3]).to_owned())?;
        let mut rotation = [[0.0; 3]; 3];
        for ((i, j), &v) in r.indexed_iter() {
            rotation[i][j] = v;
        }
        let translation = [m[(0, 3)], m[(1, 3)], m[(2, 3)]];
        Ok(Self::new(rotation, translation))
    }

    /// 由 [`Affine`] 构造刚体变换.
    pub fn from_affine(affine: &Affine) -> MriResult<Self> {
        let m = Array2::from_shape_fn((4, 4), |(i, j)| affine.rows()[i][j]);
        Self::from_matrix(&m)
    }

    /// 旋转部分.
    #[inline]
    pub fn rotation(&self) -> &[[f64; 3]; 3] {
        &self.rotation
    }

    /// 平移部分.
    #[inline]
    pub fn translation(&self) -> &[f64; 3] {
        &self.translation
    }

    /// 生成 ITK 变换文件文本. 参数依次为行优先的 9 个旋转分量和 3 个平移分量,
    /// 每个数保留 8 位小数, 最小宽度为 4.
    pub fn to_itk_tfm(&self) -> String {
        let params = self
            .rotation
            .iter()
            .flatten()
            .chain(self.translation.iter())
            .map(|v| format!("{v:4.8}"))
            .join(" ");
        format!(
            "{ITK_TFM_MAGIC}\n#Transform 0\nTransform: AffineTransform_double_3_3\n\
             Parameters: {params}\nFixedParameters: 0 0 0\n"
        )
    }
}

/// 解析空白分隔的数值矩阵文本.
///
/// `#` 之后的内容视为注释, 空行被忽略. 各行列数必须相同.
pub fn parse_matrix(text: &str) -> MriResult<Array2<f64>> {
    let mut values = Vec::with_capacity(16);
    let mut width = None;
    let mut rows = 0usize;

    for (lineno, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|tok| {
                tok.parse::<f64>().map_err(|_| {
                    MriError::MatrixFormat(format!("line {}: invalid number {tok:?}", lineno + 1))
                })
            })
            .collect::<MriResult<Vec<_>>>()?;
        match width {
            None => width = Some(row.len()),
            Some(w) if w != row.len() => {
                return Err(MriError::MatrixFormat(format!(
                    "line {}: expected {w} columns, found {}",
                    lineno + 1,
                    row.len()
                )));
            }
            _ => {}
        }
        values.extend(row);
        rows += 1;
    }
    let cols = width.unwrap_or(0);
    Ok(Array2::from_shape_vec((rows, cols), values)?)
}

/// 读取矩阵文本文件.
pub fn read_matrix<P: AsRef<Path>>(path: P) -> MriResult<Array2<f64>> {
    parse_matrix(&fs::read_to_string(path)?)
}

/// 输入路径对应的输出路径: 在原文件名后追加 `.rigid.tfm`.
pub fn rigid_tfm_path<P: AsRef<Path>>(input: P) -> PathBuf {
    let mut s = input.as_ref().as_os_str().to_owned();
    s.push(RIGID_TFM_SUFFIX);
    PathBuf::from(s)
}

/// 读取 `input` 中的仿射矩阵, 转换为刚体变换并写入 `<input>.rigid.tfm`.
///
/// # 返回值
///
/// 输出文件路径.
pub fn convert_file<P: AsRef<Path>>(input: P) -> MriResult<PathBuf> {
    let input = input.as_ref();
    let m = read_matrix(input)?;
    let rigid = RigidTransform::from_matrix(&m)?;
    let output = rigid_tfm_path(input);
    fs::write(&output, rigid.to_itk_tfm())?;
    log::info!("Rigid transform written to {}", output.display());
    Ok(output)
}
