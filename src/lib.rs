//! vidmuse: long-form video-to-music generation.
//!
//! This library drives autoregressive music generation conditioned on video
//! (and text) for durations far beyond the decoder's fixed context window.
//! The windowed generation controller repeatedly invokes the bounded-context
//! decoder, stitches the token chunks into one sequence, and re-windows the
//! video conditioning so both timelines stay synchronized.
//!
//! # Modules
//!
//! - [`types`]: Core data types (ModelConfig, GenerationParams, TokenSequence)
//! - [`conditioning`]: Video features, attribute records, the attribute builder
//! - [`models`]: ONNX model wrappers and the decoder/codec trait boundaries
//! - [`generation`]: The windowed controller and the session facade
//! - [`audio`]: WAV I/O and sample-rate conversion
//! - [`config`]: Runtime configuration (device, precision, model paths)
//! - [`error`]: Error codes and types
//!
//! # Example
//!
//! ```rust,ignore
//! use vidmuse::config::EngineConfig;
//! use vidmuse::generation::GenerationSession;
//! use vidmuse::models::load_models;
//! use vidmuse::types::GenerationParams;
//!
//! let config = EngineConfig::from_env();
//! let models = load_models(&config.effective_model_path(), &config.execution_context())?;
//! let mut session = GenerationSession::from_models(models)?;
//! session.set_generation_params(GenerationParams::with_duration(120.0))?;
//!
//! let video = vidmuse::conditioning::VideoFeatures::load("features.json".as_ref())?;
//! let tokens = session.generate(
//!     vidmuse::conditioning::VideoConditioning { local: video.clone(), global: video },
//!     &[None],
//!     true,
//! )?;
//! let audio = session.generate_audio(&tokens)?;
//! ```

pub mod audio;
pub mod cli;
pub mod conditioning;
pub mod config;
pub mod error;
pub mod generation;
pub mod models;
pub mod types;

// Re-export commonly used types at crate root for convenience
pub use config::{Device, EngineConfig, ExecutionContext, Precision};
pub use error::{EngineError, ErrorCode, Result};
pub use generation::{
    FnObserver, GenerationSession, NoopProgress, ProgressObserver, WindowedGenerationController,
};
pub use types::{GenerationParams, ModelConfig, SamplingParams, TokenSequence};
