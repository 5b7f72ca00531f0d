//! 通用常量.

use crate::orientation::{AxisOrient, Ornt};

/// 单通道掩膜取值.
pub mod gray {
    /// 掩膜中背景的体素值.
    pub const MASK_BACKGROUND: u8 = 0;

    /// 掩膜中前景的体素值.
    pub const MASK_FOREGROUND: u8 = 1;

    /// 体素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, MASK_BACKGROUND)
    }

    /// 体素是否是前景? 任意非零值都被视为前景.
    #[inline]
    pub const fn is_foreground(p: u8) -> bool {
        !is_background(p)
    }
}

/// 去颅骨时平滑 sigma 的分子. 每个轴的 sigma 为 `round(STRIP_SIGMA_BASE / 体素间距) + 1`.
pub const STRIP_SIGMA_BASE: f64 = 2.0;

/// 去颅骨时高斯核的截断位置, 以标准差为单位.
pub const STRIP_TRUNCATE: f64 = 2.0;

/// 平滑后的掩膜大于该值的体素属于扩张后的掩膜.
///
/// 偏低的取值使掩膜宁大勿小, 以容忍低分辨率和配准误差.
pub const STRIP_ENLARGE_THRESHOLD: f32 = 0.25;

/// 组织概率图中大于该值的体素参与连通域分析.
pub const TISSUE_PROBABILITY_THRESHOLD: f32 = 0.01;

/// 组织概率图中大于该值的体素参与体积累加.
pub const TISSUE_VOLUME_THRESHOLD: f32 = 0.5;

/// 模型输出至少包含的通道数: 全脑, 皮层, 大脑.
pub const TISSUE_CHANNELS: usize = 3;

/// 全脑 (颅内) 概率通道.
pub const CHANNEL_BRAIN: usize = 0;

/// 皮层概率通道.
pub const CHANNEL_CORTEX: usize = 1;

/// 大脑 (不含小脑) 概率通道.
pub const CHANNEL_CEREBRUM: usize = 2;

/// 组织分割模型输入输出所在的方向: nifti x 轴反向 (LAS+).
pub const TISSUE_MODEL_FRAME: Ornt = Ornt::new([
    AxisOrient::new(0, true),
    AxisOrient::new(1, false),
    AxisOrient::new(2, false),
]);

/// ITK 变换文件的版本行.
pub const ITK_TFM_MAGIC: &str = "#Insight Transform File V1.0";

/// ITK 刚体变换输出文件的后缀.
pub const RIGID_TFM_SUFFIX: &str = ".rigid.tfm";

/// 阈值化工具模式串中, 表示 "保留最大连通域" 的子串.
pub const MODE_LARGEST_CC: &str = "largest_cc";

/// 阈值化工具模式串中, 表示 "去颅骨" 的子串.
pub const MODE_STRIP: &str = "strip";
