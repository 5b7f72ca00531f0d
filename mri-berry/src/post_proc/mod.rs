//! 体数据后处理流程.

mod pipeline;
mod strip;

pub use pipeline::{ModeFlags, PostProcessor, Processed, StripTarget, ThresholdJob};
pub use strip::StripSettings;
