//! 基于预计算概率图的模型后端.

use super::{ModelLoader, SegmentationModel};
use crate::data::{read_channels, write_channels};
use crate::{MriError, MriResult};
use ndarray::{Array4, ArrayView3, Axis};
use nifti::NiftiHeader;
use std::path::{Path, PathBuf};

/// 预先计算好的各通道概率图, 已位于模型方向下, 按 `(channel, z, y, x)` 排列.
///
/// 外部推理引擎可以将结果写成 4D nifti, 再由该后端接入估计流程.
#[derive(Debug, Clone)]
pub struct ProbabilityMaps {
    maps: Array4<f32>,
}

impl ProbabilityMaps {
    /// 直接包装概率图.
    #[inline]
    pub fn new(maps: Array4<f32>) -> Self {
        Self { maps }
    }

    /// 通道个数.
    #[inline]
    pub fn channels(&self) -> usize {
        self.maps.len_of(Axis(0))
    }

    /// 以 `reference` 为模板写为 4D nifti 文件, 供 [`ProbabilityMapLoader`] 读取.
    pub fn save<P: AsRef<Path>>(&self, path: P, reference: &NiftiHeader) -> MriResult<()> {
        write_channels(path.as_ref(), reference, self.maps.view())
    }
}

impl SegmentationModel for ProbabilityMaps {
    /// 返回概率图本身. 输入只用于检查空间形状.
    fn predict(&self, input: ArrayView3<f32>) -> MriResult<Array4<f32>> {
        let (_, z, y, x) = self.maps.dim();
        if (z, y, x) != input.dim() {
            return Err(MriError::Model(format!(
                "probability maps have shape {:?}, input has {:?}",
                (z, y, x),
                input.dim()
            )));
        }
        Ok(self.maps.clone())
    }
}

/// 从 4D nifti 文件加载 [`ProbabilityMaps`]. 第 4 个轴为通道.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbabilityMapLoader {
    path: PathBuf,
}

impl ProbabilityMapLoader {
    /// 以文件路径创建加载器. 此时不读取文件.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_owned(),
        }
    }

    /// 概率图文件路径.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModelLoader for ProbabilityMapLoader {
    type Model = ProbabilityMaps;

    fn load(&self) -> MriResult<ProbabilityMaps> {
        let (_, maps) = read_channels(&self.path)?;
        log::debug!(
            "{} probability map(s) of shape {:?} loaded from {}",
            maps.len_of(Axis(0)),
            &maps.shape()[1..],
            self.path.display()
        );
        Ok(ProbabilityMaps::new(maps))
    }
}
