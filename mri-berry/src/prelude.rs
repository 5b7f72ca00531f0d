//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;
pub use crate::{Affine, BinaryMask, MaskVolume, NiftiHeaderAttr, Volume};
pub use crate::{MriError, MriResult};

pub use crate::consts::gray::{MASK_BACKGROUND, MASK_FOREGROUND};
pub use crate::consts::{CHANNEL_BRAIN, CHANNEL_CEREBRUM, CHANNEL_CORTEX, TISSUE_CHANNELS};

pub use crate::filter::gaussian_filter;
pub use crate::morph_3d::{
    label_components, select_largest_component, select_largest_component_with, Connectivity,
    EmptyMaskError, LabelMap,
};

pub use crate::orientation::{apply_orientation, io_orientation, ornt_transform, AxisOrient, Ornt};
pub use crate::post_proc::{ModeFlags, PostProcessor, Processed, StripSettings, ThresholdJob};
pub use crate::tissues::{
    apply_tissues, ModelLoader, ModelService, ProbabilityMapLoader, ProbabilityMaps,
    SegmentationModel, TissueEstimate, TissueEstimator, TissueOutputs, TissueSettings,
    VolumeEstimate,
};
pub use crate::transform::{convert_file, RigidTransform};
