//! Per-sample conditioning records.
//!
//! Every requested output sample carries exactly one
//! [`ConditioningAttributes`] record. A record always has a wav slot: when no
//! melody signal exists the slot holds an explicit zero-length placeholder
//! rather than being absent, which keeps the decoder's conditioning-shape
//! contract uniform.

use std::path::PathBuf;

use ndarray::Array3;

use super::video::VideoFeatures;

/// A waveform conditioning signal with its validity length and provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct WavCondition {
    /// Waveform samples, `[batch, channels, time]`.
    pub samples: Array3<f32>,
    /// Number of valid samples along the time axis. Zero marks a placeholder.
    pub length: usize,
    /// Sample rate of `samples` in Hz.
    pub sample_rate: u32,
    /// Source file, when the signal came from disk.
    pub path: Option<PathBuf>,
}

impl WavCondition {
    /// Creates the zero-length placeholder used when no melody is supplied.
    pub fn empty(sample_rate: u32) -> Self {
        Self {
            samples: Array3::zeros((1, 1, 1)),
            length: 0,
            sample_rate,
            path: None,
        }
    }

    /// Creates a condition from a real `[channels, time]` melody waveform.
    pub fn from_melody(samples: Array3<f32>, sample_rate: u32) -> Self {
        let length = samples.dim().2;
        Self {
            samples,
            length,
            sample_rate,
            path: None,
        }
    }

    /// True when this slot is the explicit placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.length == 0
    }
}

/// Conditioning for one output sample: a text description and a wav slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditioningAttributes {
    /// Free-form text description; None for unconditional samples.
    pub description: Option<String>,
    /// Melody/audio conditioning signal, placeholder when absent.
    pub wav: WavCondition,
}

impl ConditioningAttributes {
    /// Creates a record with a placeholder wav slot.
    pub fn new(description: Option<String>, sample_rate: u32) -> Self {
        Self {
            description,
            wav: WavCondition::empty(sample_rate),
        }
    }
}

/// The two co-passed video conditioning groups.
///
/// The decoder consumes a fine-grained time-varying group and a coarse static
/// group together. Only `local` is subject to time-axis windowing by the
/// generation controller; `global` rides along unmodified.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoConditioning {
    /// Time-varying features, windowed chunk by chunk.
    pub local: VideoFeatures,
    /// Static whole-clip features.
    pub global: VideoFeatures,
}

/// Everything the decoder is conditioned on for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditioningSet {
    /// One record per requested output sample.
    pub attributes: Vec<ConditioningAttributes>,
    /// Video conditioning, when generating from video.
    pub video: Option<VideoConditioning>,
}

impl ConditioningSet {
    /// A set conditioned on text (or nothing) only.
    pub fn from_attributes(attributes: Vec<ConditioningAttributes>) -> Self {
        Self {
            attributes,
            video: None,
        }
    }

    /// A set conditioned on video, with one attribute record per batch entry.
    pub fn with_video(attributes: Vec<ConditioningAttributes>, video: VideoConditioning) -> Self {
        Self {
            attributes,
            video: Some(video),
        }
    }

    /// Number of output samples this set conditions.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// True when no attribute records are held.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Replaces the local video window, keeping everything else.
    ///
    /// Used by the controller to pass a re-windowed view into each chunk's
    /// decoder call without touching the global group.
    pub fn with_local_window(&self, local: VideoFeatures) -> Self {
        let video = self.video.as_ref().map(|v| VideoConditioning {
            local,
            global: v.global.clone(),
        });
        Self {
            attributes: self.attributes.clone(),
            video,
        }
    }
}
