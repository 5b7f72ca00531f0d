//! 脑组织分割后处理与体积估计.
//!
//! 分割网络本身由外部注入 ([`SegmentationModel`]). 本模块负责:
//!
//! 1. 对输入做 z-score 归一化, 并转换到模型所需方向;
//! 2. 调用模型得到各通道概率图;
//! 3. 对全脑, 大脑通道保留最大连通域并估计体积;
//! 4. 将各通道转换回输入方向并写出.

use crate::consts::*;
use crate::morph_3d::{select_largest_component_with, Connectivity};
use crate::orientation::{apply_orientation, io_orientation, ornt_transform, Ornt};
use crate::{BinaryMask, MriError, MriResult, NiftiHeaderAttr, Volume};
use ndarray::{Array3, Array4, ArrayView3, Axis, Zip};
use num::ToPrimitive;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod model;

pub use model::{ProbabilityMapLoader, ProbabilityMaps};

/// 体积分割模型.
pub trait SegmentationModel {
    /// 对模型方向下已归一化的 `(z, y, x)` 体数据推理.
    ///
    /// # 返回值
    ///
    /// `(channel, z, y, x)` 排列的概率图, 空间形状与输入一致,
    /// 至少包含 [`TISSUE_CHANNELS`] 个通道.
    fn predict(&self, input: ArrayView3<f32>) -> MriResult<Array4<f32>>;
}

impl<F> SegmentationModel for F
where
    F: Fn(ArrayView3<f32>) -> MriResult<Array4<f32>>,
{
    #[inline]
    fn predict(&self, input: ArrayView3<f32>) -> MriResult<Array4<f32>> {
        self(input)
    }
}

/// 模型加载器.
pub trait ModelLoader {
    /// 加载得到的模型类型.
    type Model: SegmentationModel;

    /// 加载模型. 该操作可能很昂贵.
    fn load(&self) -> MriResult<Self::Model>;
}

/// 模型服务: 首次使用时加载, 之后复用, 直到显式释放.
pub struct ModelService<L: ModelLoader> {
    loader: L,
    model: Option<L::Model>,
}

impl<L: ModelLoader> ModelService<L> {
    /// 创建服务. 此时不加载模型.
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            model: None,
        }
    }

    /// 获取模型. 尚未加载时先加载.
    pub fn get(&mut self) -> MriResult<&L::Model> {
        let model = match self.model.take() {
            Some(model) => model,
            None => {
                log::info!("Loading model");
                self.loader.load()?
            }
        };
        let model: &L::Model = self.model.insert(model);
        Ok(model)
    }

    /// 模型是否已加载?
    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// 释放已加载的模型. 之后的 [`Self::get`] 会重新加载.
    pub fn teardown(&mut self) {
        if self.model.take().is_some() {
            log::debug!("model released");
        }
    }

    /// 获取加载器.
    #[inline]
    pub fn loader(&self) -> &L {
        &self.loader
    }
}

/// 组织体积估计参数.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TissueSettings {
    /// 概率严格大于该值的体素参与连通域分析.
    pub probability_threshold: f32,

    /// 概率严格大于该值的体素参与体积累加.
    pub volume_threshold: f32,

    /// 模型输入输出所在的方向.
    pub model_frame: Ornt,

    /// 连通域分析的邻接规则.
    pub connectivity: Connectivity,
}

impl Default for TissueSettings {
    fn default() -> Self {
        Self {
            probability_threshold: TISSUE_PROBABILITY_THRESHOLD,
            volume_threshold: TISSUE_VOLUME_THRESHOLD,
            model_frame: TISSUE_MODEL_FRAME,
            connectivity: Connectivity::Face,
        }
    }
}

/// 估计得到的体积, 以立方毫米为单位.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VolumeEstimate {
    /// 颅内体积 (intra-cranial volume).
    pub intracranial: f64,

    /// 大脑 (不含小脑) 体积.
    pub cerebrum: f64,
}

/// 组织体积估计的完整结果.
#[derive(Debug, Clone)]
pub struct TissueEstimate {
    /// 体积.
    pub volumes: VolumeEstimate,

    /// 各通道概率图, 已转换回输入方向, 沿用输入 header.
    /// 全脑和大脑通道已去除最大连通域以外的部分.
    pub channels: Vec<Volume>,
}

/// 组织输出文件路径. 以输入路径去掉 `.nii.gz` 或 `.nii` 后缀后的部分为前缀.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TissueOutputs {
    stem: OsString,
}

impl TissueOutputs {
    /// 由输入路径推断输出路径.
    pub fn for_input<P: AsRef<Path>>(input: P) -> Self {
        let full = input.as_ref().as_os_str();
        let stem = full
            .to_str()
            .and_then(|s| s.strip_suffix(".nii.gz").or_else(|| s.strip_suffix(".nii")))
            .map_or_else(|| full.to_owned(), OsString::from);
        Self { stem }
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut s = self.stem.clone();
        s.push(suffix);
        PathBuf::from(s)
    }

    /// 颅内体积文本: `<stem>_eTIV.txt`.
    #[inline]
    pub fn intracranial_text(&self) -> PathBuf {
        self.with_suffix("_eTIV.txt")
    }

    /// 大脑体积文本: `<stem>_eTIV_nocerebellum.txt`.
    #[inline]
    pub fn cerebrum_text(&self) -> PathBuf {
        self.with_suffix("_eTIV_nocerebellum.txt")
    }

    /// 第 `k` 个通道概率图: `<stem>_tissues<k>.nii.gz`.
    #[inline]
    pub fn channel(&self, k: usize) -> PathBuf {
        self.with_suffix(&format!("_tissues{k}.nii.gz"))
    }
}

/// 按总体标准差做 z-score 归一化.
///
/// # 返回值
///
/// 若数据为空, 标准差为零或非有限值, 则返回 `Err`.
pub fn zscore(data: ArrayView3<f32>) -> MriResult<Array3<f32>> {
    let n = data.len() as f64;
    if data.is_empty() {
        return Err(MriError::ConstantIntensity);
    }
    let mean = data.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = data.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    if !(std.is_finite() && std > 0.0) {
        return Err(MriError::ConstantIntensity);
    }
    log::debug!("z-score: mean = {mean}, std = {std}");
    Ok(data.mapv(|v| ((v as f64 - mean) / std) as f32))
}

/// 将体积值向零截断为整数.
pub fn truncate_volume(vol: f64) -> MriResult<i64> {
    vol.to_i64().ok_or(MriError::NotRepresentable(vol))
}

/// 组织体积估计器.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct TissueEstimator {
    settings: TissueSettings,
}

impl TissueEstimator {
    /// 以指定参数创建估计器.
    pub fn new(settings: TissueSettings) -> Self {
        Self { settings }
    }

    /// 参数.
    #[inline]
    pub fn settings(&self) -> &TissueSettings {
        &self.settings
    }

    /// 只保留 `prob` 中高于概率阈值部分的最大连通域, 其余置零.
    pub fn clean_channel(&self, mut prob: Array3<f32>) -> MriResult<Array3<f32>> {
        let threshold = self.settings.probability_threshold;
        let fg = BinaryMask::from_predicate(prob.view(), |v| v > threshold);
        let largest = select_largest_component_with(&fg, self.settings.connectivity)?;
        Zip::from(&mut prob)
            .and(largest.data())
            .for_each(|p, &m| *p *= f32::from(m));
        Ok(prob)
    }

    /// 概率严格大于体积阈值的体素概率之和, 乘以单个体素体积.
    pub fn channel_volume(&self, prob: ArrayView3<f32>, voxel_volume: f64) -> f64 {
        let threshold = self.settings.volume_threshold;
        let sum: f64 = prob
            .iter()
            .filter(|&&p| p > threshold)
            .map(|&p| p as f64)
            .sum();
        sum * voxel_volume
    }

    /// 对 `input` 执行完整的组织体积估计.
    pub fn estimate<M: SegmentationModel>(&self, input: &Volume, model: &M) -> MriResult<TissueEstimate> {
        let start = io_orientation(&input.affine())?;
        let frame = self.settings.model_frame;
        let to_model = ornt_transform(&start, &frame)?;
        let from_model = ornt_transform(&frame, &start)?;
        log::debug!(
            "input orientation {:?}, model orientation {:?}",
            start.axcodes(),
            frame.axcodes()
        );

        let normalized = zscore(input.data())?;
        let model_input = apply_orientation(normalized.view(), &to_model);
        let output = model.predict(model_input.view())?;
        let (c, z, y, x) = output.dim();
        if c < TISSUE_CHANNELS || (z, y, x) != model_input.dim() {
            return Err(MriError::Model(format!(
                "expected at least {TISSUE_CHANNELS} channels of shape {:?}, found {:?}",
                model_input.dim(),
                output.dim()
            )));
        }

        let voxel_volume = input.voxel_volume();
        let mut channels = Vec::with_capacity(c);
        let mut volumes = [0.0; 2];
        for (k, prob) in output.axis_iter(Axis(0)).enumerate() {
            let prob = match k {
                CHANNEL_BRAIN | CHANNEL_CEREBRUM => {
                    let prob = self.clean_channel(prob.to_owned())?;
                    let slot = usize::from(k == CHANNEL_CEREBRUM);
                    volumes[slot] = self.channel_volume(prob.view(), voxel_volume);
                    prob
                }
                _ => prob.to_owned(),
            };
            let back = apply_orientation(prob.view(), &from_model);
            channels.push(input.with_data(back)?);
        }

        let volumes = VolumeEstimate {
            intracranial: volumes[0],
            cerebrum: volumes[1],
        };
        log::info!(
            "Estimated intra-cranial volume (mm^3): {}",
            truncate_volume(volumes.intracranial)?
        );
        log::info!(
            "Estimated cerebrum volume (mm^3): {}",
            truncate_volume(volumes.cerebrum)?
        );
        Ok(TissueEstimate { volumes, channels })
    }
}

impl TissueEstimate {
    /// 写出体积文本和各通道概率图.
    ///
    /// 顺序依次为: 颅内体积, 全脑通道, 大脑体积, 大脑通道, 其余通道.
    pub fn save(&self, outputs: &TissueOutputs) -> MriResult<()> {
        let icv = truncate_volume(self.volumes.intracranial)?;
        let cerebrum = truncate_volume(self.volumes.cerebrum)?;

        fs::write(outputs.intracranial_text(), format!("{icv}\n"))?;
        self.save_channel(outputs, CHANNEL_BRAIN)?;
        fs::write(outputs.cerebrum_text(), format!("{cerebrum}\n"))?;
        self.save_channel(outputs, CHANNEL_CEREBRUM)?;
        for k in (0..self.channels.len()).filter(|&k| k != CHANNEL_BRAIN && k != CHANNEL_CEREBRUM) {
            self.save_channel(outputs, k)?;
        }
        Ok(())
    }

    fn save_channel(&self, outputs: &TissueOutputs, k: usize) -> MriResult<()> {
        let path = outputs.channel(k);
        self.channels[k].save(&path)?;
        log::debug!("channel {k} written to {}", path.display());
        Ok(())
    }
}

/// 读取 `input`, 以 `service` 提供的模型估计组织体积, 并写出所有结果.
pub fn apply_tissues<L: ModelLoader, P: AsRef<Path>>(
    input: P,
    service: &mut ModelService<L>,
) -> MriResult<TissueEstimate> {
    let input = input.as_ref();
    log::info!("Loading image {}", input.display());
    let volume = Volume::open(input)?;
    let model = service.get()?;
    let estimate = TissueEstimator::default().estimate(&volume, model)?;
    estimate.save(&TissueOutputs::for_input(input))?;
    Ok(estimate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Affine;
    use ndarray::{s, Array4};
    use std::cell::Cell;

    #[test]
    fn test_zscore() {
        let data = Array3::from_shape_fn((2, 3, 4), |(z, y, x)| (z * 12 + y * 4 + x) as f32);
        let out = zscore(data.view()).unwrap();
        let n = out.len() as f64;
        let mean = out.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = out.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 1e-6);
        assert!((var - 1.0).abs() < 1e-5);

        let flat = Array3::from_elem((2, 2, 2), 3.0f32);
        assert!(matches!(zscore(flat.view()), Err(MriError::ConstantIntensity)));
    }

    #[test]
    fn test_truncate_volume() {
        assert_eq!(truncate_volume(1234.99).unwrap(), 1234);
        assert_eq!(truncate_volume(-0.5).unwrap(), 0);
        assert!(matches!(
            truncate_volume(f64::NAN),
            Err(MriError::NotRepresentable(_))
        ));
    }

    #[test]
    fn test_output_paths() {
        let o = TissueOutputs::for_input("/data/sub01_T1.nii.gz");
        assert_eq!(o.intracranial_text(), PathBuf::from("/data/sub01_T1_eTIV.txt"));
        assert_eq!(
            o.cerebrum_text(),
            PathBuf::from("/data/sub01_T1_eTIV_nocerebellum.txt")
        );
        assert_eq!(o.channel(2), PathBuf::from("/data/sub01_T1_tissues2.nii.gz"));

        let o = TissueOutputs::for_input("scan.nii");
        assert_eq!(o.channel(0), PathBuf::from("scan_tissues0.nii.gz"));
    }

    /// 6-邻接下两个不相连的区域, 只保留较大者.
    #[test]
    fn test_clean_channel() {
        let mut prob = Array3::<f32>::zeros((3, 3, 6));
        prob.slice_mut(s![.., .., 0..2]).fill(0.8);
        prob[(1, 1, 2)] = 0.005; // 低于概率阈值, 不连通.
        prob[(1, 1, 4)] = 0.9;
        let est = TissueEstimator::default();
        let cleaned = est.clean_channel(prob.clone()).unwrap();
        assert_eq!(cleaned[(1, 1, 4)], 0.0);
        assert_eq!(cleaned[(1, 1, 2)], 0.0);
        assert_eq!(cleaned[(0, 0, 0)], 0.8);

        assert!(matches!(
            est.clean_channel(Array3::zeros((2, 2, 2))),
            Err(MriError::EmptyMask(_))
        ));
    }

    #[test]
    fn test_channel_volume() {
        let prob = ndarray::arr3(&[[[0.25f32, 0.5, 0.75, 1.0]]]);
        let v = TissueEstimator::default().channel_volume(prob.view(), 2.0);
        assert!((v - 3.5).abs() < 1e-9);
    }

    /// 模型方向下 x < 2 的平板为全脑, x < 1 为大脑, (0, 0, 3) 处有一个孤立噪点.
    fn slab_model(input: ArrayView3<f32>) -> MriResult<Array4<f32>> {
        let (z, y, x) = input.dim();
        let mut out = Array4::<f32>::zeros((3, z, y, x));
        out.slice_mut(s![0, .., .., 0..2]).fill(0.9);
        out[(0, 0, 0, 3)] = 0.9;
        out.slice_mut(s![1, .., .., ..]).fill(0.3);
        out.slice_mut(s![2, .., .., 0..1]).fill(0.6);
        Ok(out)
    }

    #[test]
    fn test_estimate() {
        let data = Array3::from_shape_fn((4, 4, 4), |(z, y, x)| (z + 2 * y + 3 * x) as f32);
        let input = Volume::from_affine(&Affine::from_zooms([2.0, 2.0, 2.0]), data).unwrap();
        let est = TissueEstimator::default().estimate(&input, &slab_model).unwrap();

        // 32 * 0.9 * 8, 16 * 0.6 * 8.
        assert_eq!(truncate_volume(est.volumes.intracranial).unwrap(), 230);
        assert_eq!(truncate_volume(est.volumes.cerebrum).unwrap(), 76);

        // 输入为 RAS, 模型为 LAS: 转换回来后 x 轴反向.
        assert_eq!(est.channels.len(), 3);
        let brain = &est.channels[CHANNEL_BRAIN];
        assert_eq!(brain.shape(), (4, 4, 4));
        assert_eq!(brain[(2, 1, 3)], 0.9);
        assert_eq!(brain[(2, 1, 2)], 0.9);
        assert_eq!(brain[(2, 1, 0)], 0.0);
        // 噪点 (模型方向 x = 3) 被去除.
        assert_eq!(brain[(0, 0, 0)], 0.0);
        assert!(est.channels[CHANNEL_CORTEX].data().iter().all(|&p| p == 0.3));
        assert_eq!(est.channels[CHANNEL_CEREBRUM][(3, 3, 3)], 0.6);
        assert_eq!(brain.affine(), input.affine());
    }

    #[test]
    fn test_estimate_bad_model_output() {
        let input = Volume::from_affine(
            &Affine::identity(),
            Array3::from_shape_fn((2, 2, 2), |(z, _, _)| z as f32),
        ).unwrap();
        let two_channels = |v: ArrayView3<f32>| -> MriResult<Array4<f32>> {
            let (z, y, x) = v.dim();
            Ok(Array4::zeros((2, z, y, x)))
        };
        assert!(matches!(
            TissueEstimator::default().estimate(&input, &two_channels),
            Err(MriError::Model(_))
        ));
        let wrong_shape =
            |_: ArrayView3<f32>| -> MriResult<Array4<f32>> { Ok(Array4::zeros((3, 1, 1, 1))) };
        assert!(matches!(
            TissueEstimator::default().estimate(&input, &wrong_shape),
            Err(MriError::Model(_))
        ));
    }

    struct CountingLoader {
        loads: Cell<usize>,
    }

    impl ModelLoader for CountingLoader {
        type Model = fn(ArrayView3<f32>) -> MriResult<Array4<f32>>;

        fn load(&self) -> MriResult<Self::Model> {
            self.loads.set(self.loads.get() + 1);
            Ok(slab_model)
        }
    }

    #[test]
    fn test_model_service_loads_once() {
        let mut service = ModelService::new(CountingLoader {
            loads: Cell::new(0),
        });
        assert!(!service.is_loaded());
        service.get().unwrap();
        service.get().unwrap();
        assert!(service.is_loaded());
        assert_eq!(service.loader().loads.get(), 1);

        service.teardown();
        assert!(!service.is_loaded());
        service.get().unwrap();
        assert_eq!(service.loader().loads.get(), 2);
    }
}
