//! Conditioning inputs for generation.
//!
//! This module covers everything the decoder is conditioned on:
//! - [`VideoFeatures`]: 5-D video feature tensors with time-axis windowing
//! - [`ConditioningAttributes`] / [`WavCondition`]: per-sample text + wav records
//! - [`ConditioningSet`] / [`VideoConditioning`]: the local/global group pair
//! - [`ConditioningAttributeBuilder`]: request inputs -> attributes + prompt tokens

pub mod attributes;
pub mod builder;
pub mod video;

// Re-export commonly used types
pub use attributes::{ConditioningAttributes, ConditioningSet, VideoConditioning, WavCondition};
pub use builder::ConditioningAttributeBuilder;
pub use video::VideoFeatures;
