//! 运行时错误.

use crate::morph_3d::EmptyMaskError;
use crate::Idx3d;

/// 本 crate 的运行时错误.
#[derive(Debug, thiserror::Error)]
pub enum MriError {
    /// 命令行参数错误.
    #[error("usage: {0}")]
    Usage(String),

    /// 需要前景时掩膜为空.
    #[error(transparent)]
    EmptyMask(#[from] EmptyMaskError),

    /// nifti 文件读写错误.
    #[error("nifti error: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// 其他底层 I/O 错误.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ndarray 形状构造错误.
    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// 两个体数据形状不一致. 形状按 `(z, y, x)` 给出.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// 期望形状.
        expected: Idx3d,
        /// 实际形状.
        found: Idx3d,
    },

    /// 维度长度超出 nifti header 可表示的范围 (`u16`).
    #[error("dimension of length {0} cannot be stored in a nifti header")]
    DimensionOverflow(usize),

    /// 文件不是 3D 体数据 (维度小于 3, 或第 4 维及以后不为 1).
    #[error("not a 3D volume, header dim = {0:?}")]
    NotVolume([u16; 8]),

    /// 体素间距为零或非有限值. 按 nifti `(x, y, z)` 顺序给出.
    #[error("invalid voxel spacing {0:?}")]
    InvalidSpacing([f64; 3]),

    /// 线性代数运算失败.
    #[error("linear algebra error: {0}")]
    Linalg(#[from] ndarray_linalg::error::LinalgError),

    /// 文本矩阵格式错误.
    #[error("malformed matrix: {0}")]
    MatrixFormat(String),

    /// 仿射矩阵存在退化 (全零) 的轴.
    #[error("degenerate affine: axis {0} has no direction")]
    DegenerateAffine(usize),

    /// 两个方向之间不存在对应关系.
    #[error("incompatible orientations")]
    IncompatibleOrientation,

    /// 图像强度为常数, 无法归一化.
    #[error("intensity is constant or not finite, cannot normalize")]
    ConstantIntensity,

    /// 数值无法用整数表示.
    #[error("value {0} is not representable as an integer")]
    NotRepresentable(f64),

    /// 分割模型加载或推理错误.
    #[error("model error: {0}")]
    Model(String),
}

/// 本 crate 的运行时结果.
pub type MriResult<T> = Result<T, MriError>;
