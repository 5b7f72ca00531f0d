#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 提供 3D 脑部 MRI nifti 文件的结构化信息和后处理算法.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 所有体数据在内存中统一按 `(z, y, x)` 行优先存储. nifti 的第 `i`
//!   个轴 (`i = 0` 为 x) 对应内存中的第 `2 - i` 个轴. 读写 nifti
//!   文件时会自动转换, 调用者无需关心.
//! 2. 除非文档特别说明, 运行时错误均以 [`MriError`] 返回, 不会 panic.
//!
//! # 功能
//!
//! ### 阈值化与最大连通域 ✅
//!
//! 26-邻域 (或 6-邻域) 连通域标记, 按体素数选取最大连通域,
//! 体素数相同时标签号小者优先.
//!
//! 实现位于 `mri-berry/src/morph_3d`.
//!
//! ### 高斯平滑 ✅
//!
//! 可分离的三维高斯滤波, 各轴 sigma 独立, 边界按半采样对称 (reflect) 延拓.
//!
//! 实现位于 `mri-berry/src/filter`.
//!
//! ### 体数据后处理 (阈值 -> 最大连通域 -> 去颅骨) ✅
//!
//! 实现位于 `mri-berry/src/post_proc`.
//!
//! ### 仿射矩阵转刚体变换 ✅
//!
//! 取 3x3 部分的正交极分解因子, 输出 ITK `.tfm` 文本.
//!
//! 实现位于 `mri-berry/src/transform.rs`.
//!
//! ### 方向变换 ✅
//!
//! 根据仿射矩阵推断各轴方向, 并在不同方向之间翻转/转置体数据.
//!
//! 实现位于 `mri-berry/src/orientation.rs`.
//!
//! ### 组织体积估计 ✅
//!
//! 模型推理本身由外部注入 ([`tissues::SegmentationModel`]),
//! 本库负责归一化、方向变换、最大连通域清理、体积估计和结果写出.
//!
//! 实现位于 `mri-berry/src/tissues`.

/// 三维索引, 按 `(z, y, x)` 排列.
pub type Idx3d = (usize, usize, usize);

/// 3D MRI nii 文件基础数据结构.
mod data;

pub use data::{Affine, BinaryMask, MaskVolume, NiftiHeaderAttr, Volume};

pub mod consts;

mod error;

pub use error::{MriError, MriResult};

pub mod filter;

mod linalg;

pub mod morph_3d;

pub mod orientation;

pub mod post_proc;

pub mod tissues;

pub mod transform;

pub mod prelude;
