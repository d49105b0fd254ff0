//! Generation parameter types.
//!
//! Generation parameters are held as an immutable record: the session
//! validates them once when they are set and never mutates them mid-call,
//! so a generation in flight cannot observe a half-updated configuration.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Sampling parameters forwarded to the decoder on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Sample from the output distribution if true, else argmax decoding.
    pub use_sampling: bool,

    /// Keep only the k most probable tokens when sampling.
    pub top_k: usize,

    /// Nucleus sampling threshold; when nonzero it takes precedence over top_k.
    pub top_p: f32,

    /// Softmax temperature.
    pub temperature: f32,

    /// Classifier-free guidance coefficient.
    pub cfg_coef: f32,

    /// Run conditional and unconditional passes separately instead of batched.
    pub two_step_cfg: bool,

    /// Seed for reproducible sampling. None uses thread-local entropy.
    pub seed: Option<u64>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            use_sampling: true,
            top_k: 250,
            top_p: 0.0,
            temperature: 1.0,
            cfg_coef: 3.0,
            two_step_cfg: false,
            seed: None,
        }
    }
}

/// Parameters for one generation request.
///
/// Constructed once, validated against the model's maximum context duration,
/// and passed read-only into the windowed generation controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Duration of the generated audio in seconds.
    pub duration: f64,

    /// Seconds of newly committed output per chunk when extending past the
    /// decoder's maximum context. Must be strictly less than the model's
    /// max duration; the difference is the overlap kept as continuity anchor.
    pub extend_stride: f64,

    /// Sampling configuration forwarded to the decoder.
    pub sampling: SamplingParams,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            duration: 30.0,
            extend_stride: 29.5,
            sampling: SamplingParams::default(),
        }
    }
}

impl GenerationParams {
    /// Creates parameters for the given duration, keeping all other defaults.
    pub fn with_duration(duration: f64) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    /// Validates the parameters against the model's maximum context duration.
    ///
    /// Fails with `INVALID_CONFIGURATION` so misconfiguration surfaces at
    /// parameter-set time, before any generation is attempted.
    pub fn validate(&self, max_duration_sec: f32) -> Result<()> {
        if self.duration <= 0.0 {
            return Err(EngineError::invalid_configuration(format!(
                "duration must be > 0, got {}",
                self.duration
            )));
        }

        if self.extend_stride <= 0.0 {
            return Err(EngineError::invalid_configuration(format!(
                "extend_stride must be > 0, got {}",
                self.extend_stride
            )));
        }

        if self.extend_stride >= max_duration_sec as f64 {
            return Err(EngineError::invalid_configuration(format!(
                "extend_stride {} must be less than the max generation duration {}",
                self.extend_stride, max_duration_sec
            )));
        }

        if self.sampling.temperature <= 0.0 {
            return Err(EngineError::invalid_configuration(format!(
                "temperature must be > 0, got {}",
                self.sampling.temperature
            )));
        }

        Ok(())
    }
}
