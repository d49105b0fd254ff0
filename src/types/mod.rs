//! Core types for the vidmuse engine.
//!
//! This module re-exports the data types used throughout the engine:
//! - [`ModelConfig`]: Architecture and rate parameters for the model ensemble
//! - [`GenerationParams`] / [`SamplingParams`]: Immutable per-request settings
//! - [`TokenSequence`]: Discrete audio tokens, `[batch, codebooks, time]`

mod config;
mod params;
mod tokens;

// Re-export all types at the module level
pub use config::ModelConfig;
pub use params::{GenerationParams, SamplingParams};
pub use tokens::TokenSequence;
