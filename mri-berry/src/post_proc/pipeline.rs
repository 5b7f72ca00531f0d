//! 阈值化 -> 最大连通域 -> 去颅骨 -> 写出.

use super::StripSettings;
use crate::consts::{MODE_LARGEST_CC, MODE_STRIP};
use crate::morph_3d::select_largest_component;
use crate::{BinaryMask, MaskVolume, MriError, MriResult, Volume};
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 后处理模式. 由模式串按子串包含关系解析, 两者可以同时开启
/// (例如 `largest_cc+strip`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModeFlags {
    /// 是否只保留最大连通域.
    pub largest_cc: bool,

    /// 是否对另一体数据去颅骨.
    pub strip: bool,
}

impl ModeFlags {
    /// 解析模式串. 未知内容被忽略.
    pub fn from_arg(mode: &str) -> Self {
        Self {
            largest_cc: mode.contains(MODE_LARGEST_CC),
            strip: mode.contains(MODE_STRIP),
        }
    }
}

/// 后处理器. 持有阈值, 模式和去颅骨参数, 本身不做任何 I/O.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PostProcessor {
    threshold: f64,
    flags: ModeFlags,
    settings: StripSettings,
}

/// 后处理结果.
#[derive(Debug, Clone)]
pub struct Processed {
    /// 二值掩膜, 沿用源体数据的 header.
    pub mask: MaskVolume,

    /// 去颅骨后的体数据. 未要求去颅骨时为 `None`.
    pub stripped: Option<Volume>,
}

impl PostProcessor {
    /// 以默认去颅骨参数创建后处理器.
    pub fn new(threshold: f64, flags: ModeFlags) -> Self {
        Self::with_settings(threshold, flags, StripSettings::default())
    }

    /// 以指定去颅骨参数创建后处理器.
    pub fn with_settings(threshold: f64, flags: ModeFlags, settings: StripSettings) -> Self {
        Self {
            threshold,
            flags,
            settings,
        }
    }

    /// 阈值.
    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// 模式.
    #[inline]
    pub fn flags(&self) -> ModeFlags {
        self.flags
    }

    /// 只计算掩膜: 阈值化, 以及可选的最大连通域筛选.
    pub fn mask(&self, source: &Volume) -> MriResult<BinaryMask> {
        let mut mask = source.threshold(self.threshold);
        log::info!(
            "Thresholded at {}: {} foreground voxel(s)",
            self.threshold,
            mask.count()
        );
        if self.flags.largest_cc {
            mask = select_largest_component(&mask)?;
            log::info!("Largest connected component: {} voxel(s)", mask.count());
        }
        Ok(mask)
    }

    /// 对 `source` 执行完整后处理.
    ///
    /// 开启去颅骨模式时 `strip_target` 必须存在, 且其形状与 `source` 相同.
    /// 未开启时 `strip_target` 被忽略.
    ///
    /// # 返回值
    ///
    /// 所有结果都在内存中计算完毕后才返回, 调用者可以此保证不会写出部分结果.
    pub fn process(&self, source: &Volume, strip_target: Option<&Volume>) -> MriResult<Processed> {
        let mask = self.mask(source)?;
        let stripped = match (self.flags.strip, strip_target) {
            (true, Some(target)) => Some(self.settings.strip(target, &mask)?),
            (true, None) => {
                return Err(MriError::Usage(
                    "strip mode requires a volume to strip".to_owned(),
                ))
            }
            (false, _) => None,
        };
        Ok(Processed {
            mask: MaskVolume::from_reference(source, mask)?,
            stripped,
        })
    }
}

impl Processed {
    /// 写出结果. 先写去颅骨结果 (若有), 再写掩膜.
    pub fn save<P: AsRef<Path>>(&self, mask_output: P, stripped_output: Option<&Path>) -> MriResult<()> {
        if let Some(stripped) = &self.stripped {
            let path = stripped_output.ok_or_else(|| {
                MriError::Usage("no output path for the stripped volume".to_owned())
            })?;
            stripped.save(path)?;
            log::info!("Stripped volume written to {}", path.display());
        }
        self.mask.save(mask_output.as_ref())?;
        log::info!("Mask written to {}", mask_output.as_ref().display());
        Ok(())
    }
}

/// 去颅骨任务的输入和输出路径.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StripTarget {
    /// 待去颅骨的 MRI 体数据.
    pub input: PathBuf,

    /// 去颅骨结果输出路径.
    pub output: PathBuf,
}

/// 一次完整的阈值化任务, 包括所有输入输出路径.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThresholdJob {
    /// 源体数据.
    pub input: PathBuf,

    /// 掩膜输出路径.
    pub output: PathBuf,

    /// 去颅骨任务. 仅在模式包含 `strip` 时存在.
    pub strip: Option<StripTarget>,

    /// 后处理器.
    pub processor: PostProcessor,
}

impl ThresholdJob {
    /// 由命令行参数构造任务. 不读取任何文件.
    ///
    /// # 返回值
    ///
    /// 若模式包含 `strip` 但 `mri_input` 或 `stripped_output` 缺失, 则返回 `Err`.
    pub fn new(
        input: PathBuf,
        threshold: f64,
        output: PathBuf,
        mode: Option<&str>,
        mri_input: Option<PathBuf>,
        stripped_output: Option<PathBuf>,
    ) -> MriResult<Self> {
        let flags = mode.map(ModeFlags::from_arg).unwrap_or_default();
        let strip = if flags.strip {
            match (mri_input, stripped_output) {
                (Some(input), Some(output)) => Some(StripTarget { input, output }),
                _ => {
                    return Err(MriError::Usage(
                        "mode \"strip\" requires <mri_input> and <stripped_output>".to_owned(),
                    ))
                }
            }
        } else {
            None
        };
        Ok(Self {
            input,
            output,
            strip,
            processor: PostProcessor::new(threshold, flags),
        })
    }

    /// 读取输入, 执行后处理并写出结果. 任何错误都会中止任务.
    pub fn run(&self) -> MriResult<Processed> {
        let source = Volume::open(&self.input)?;
        log::debug!("loaded {}", self.input.display());
        let target = self
            .strip
            .as_ref()
            .map(|st| Volume::open(&st.input))
            .transpose()?;

        let processed = self.processor.process(&source, target.as_ref())?;
        processed.save(
            &self.output,
            self.strip.as_ref().map(|st| st.output.as_path()),
        )?;
        Ok(processed)
    }
}
