//! VidMuse model components.
//!
//! This module contains the ONNX model wrappers and the two library
//! boundaries the generation layer is written against:
//!
//! - [`TokenDecoder`]: the bounded-context autoregressive decoder
//! - [`AudioCodec`]: the EnCodec tokenizer/detokenizer
//!
//! Concrete implementations:
//! - [`VidMuseDecoder`](decoder::VidMuseDecoder): split decoder with KV cache
//! - [`EncodecCodec`](audio_codec::EncodecCodec): token <-> waveform codec
//! - [`VideoEncoder`](video_encoder::VideoEncoder): video conditioning tower
//! - [`TextEncoder`](text_encoder::TextEncoder): T5 text conditioning
//! - [`DelayPatternMaskIds`](delay_pattern::DelayPatternMaskIds): codebook delays
//! - [`Logits`](logits::Logits): guidance and sampling

use ndarray::Array3;

use crate::conditioning::ConditioningSet;
use crate::error::Result;
use crate::types::{SamplingParams, TokenSequence};

pub mod audio_codec;
pub mod decoder;
pub mod delay_pattern;
pub mod downloader;
pub mod loader;
pub mod logits;
pub mod text_encoder;
pub mod video_encoder;

// Re-export commonly used types
pub use audio_codec::EncodecCodec;
pub use decoder::VidMuseDecoder;
pub use delay_pattern::DelayPatternMaskIds;
pub use downloader::ensure_models;
pub use loader::{check_models, load_models, VidMuseModels, MODEL_URLS, REQUIRED_MODEL_FILES};
pub use logits::Logits;
pub use text_encoder::TextEncoder;
pub use video_encoder::VideoEncoder;

/// Per-step progress callback: `(steps_done_this_call, steps_total_this_call)`.
pub type StepCallback<'a> = &'a mut dyn FnMut(usize, usize);

/// The bounded-context autoregressive decoder boundary.
///
/// `generate` returns the supplied prompt followed by exactly `max_gen_len`
/// newly generated token frames, so the output time length is
/// `prompt_len + max_gen_len`. Implementations must invoke the callback with
/// decoder-local step counts; offsetting into the full timeline is the
/// controller's job.
pub trait TokenDecoder {
    /// Generates `max_gen_len` new token frames continuing `prompt`.
    fn generate(
        &mut self,
        prompt: Option<&TokenSequence>,
        conditioning: &ConditioningSet,
        max_gen_len: usize,
        sampling: &SamplingParams,
        callback: Option<StepCallback<'_>>,
    ) -> Result<TokenSequence>;

    /// Returns the video conditioning hidden states for a conditioning set.
    fn video_embedding(&mut self, conditioning: &ConditioningSet) -> Result<Array3<f32>>;

    /// True when the model was exported with a wav (melody) conditioner.
    fn supports_wav_conditioning(&self) -> bool;
}

/// The audio codec boundary.
pub trait AudioCodec {
    /// Encodes a `[batch, channels, time]` waveform into tokens.
    ///
    /// The second element is the codec's scale factor; this engine requires a
    /// scale-free codec, so callers treat `Some(_)` as unsupported.
    fn encode(&mut self, waveform: &Array3<f32>) -> Result<(TokenSequence, Option<f32>)>;

    /// Decodes tokens back into a `[batch, channels, time]` waveform.
    fn decode(&mut self, tokens: &TokenSequence, scale: Option<f32>) -> Result<Array3<f32>>;
}
