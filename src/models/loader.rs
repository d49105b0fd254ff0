//! Model loader for the VidMuse ONNX ensemble.
//!
//! Handles loading all required model components and configuration.

use std::path::Path;

use crate::config::{ExecutionContext, Precision};
use crate::error::{EngineError, Result};
use crate::types::ModelConfig;

use super::audio_codec::EncodecCodec;
use super::decoder::VidMuseDecoder;

/// Complete set of loaded VidMuse models.
pub struct VidMuseModels {
    /// Autoregressive decoder (with its text and video conditioning towers).
    pub decoder: VidMuseDecoder,
    /// Audio codec for token <-> waveform conversion.
    pub codec: EncodecCodec,
    /// Model configuration.
    pub config: ModelConfig,
    /// Model version string.
    pub version: String,
}

impl VidMuseModels {
    /// Returns the model version string.
    pub fn version(&self) -> &str {
        &self.version
    }
}

/// Required model files for VidMuse.
pub const REQUIRED_MODEL_FILES: &[&str] = &[
    "tokenizer.json",
    "text_encoder.onnx",
    "video_encoder.onnx",
    "decoder_model.onnx",
    "decoder_with_past_model.onnx",
    "encodec_encode.onnx",
    "encodec_decode.onnx",
];

/// Checks if all required model files exist in the directory.
///
/// Returns Ok(()) if all files exist, or an error listing missing files.
pub fn check_models(model_dir: &Path) -> Result<()> {
    let mut missing = Vec::new();

    for file in REQUIRED_MODEL_FILES {
        let path = model_dir.join(file);
        if !path.exists() {
            missing.push(*file);
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::model_not_found(format!(
            "Missing model files in {}: {}",
            model_dir.display(),
            missing.join(", ")
        )))
    }
}

/// Loads all VidMuse model sessions from a directory.
///
/// The directory should contain the files in [`REQUIRED_MODEL_FILES`] and,
/// optionally, a `config.json` describing the checkpoint (defaults to the
/// small configuration when absent).
pub fn load_models(model_dir: &Path, context: &ExecutionContext) -> Result<VidMuseModels> {
    // Check all required files exist first
    check_models(model_dir)?;

    let (config, wav_conditioner) = load_or_default_config(model_dir)?;
    if let Some(problem) = config.validate() {
        return Err(EngineError::model_load_failed(format!(
            "config.json is inconsistent: {}",
            problem
        )));
    }

    let use_fp16 = match context.precision {
        Precision::Fp16 => true,
        Precision::Fp32 => false,
        Precision::Auto => model_dir
            .to_str()
            .map(|s| s.contains("fp16"))
            .unwrap_or(false),
    };

    eprintln!("Loading decoder and conditioning towers...");
    let decoder = VidMuseDecoder::load(model_dir, config.clone(), use_fp16, wav_conditioner)?;

    eprintln!("Loading audio codec...");
    let codec = EncodecCodec::load(model_dir)?;

    let version = detect_model_version(model_dir);
    eprintln!("All models loaded successfully.");

    Ok(VidMuseModels {
        decoder,
        codec,
        config,
        version,
    })
}

/// Loads model configuration from config.json or uses defaults.
///
/// Returns the config together with whether the export carries a wav
/// (melody) conditioner.
fn load_or_default_config(model_dir: &Path) -> Result<(ModelConfig, bool)> {
    let config_path = model_dir.join("config.json");

    if !config_path.exists() {
        return Ok((ModelConfig::vidmuse_small(), false));
    }

    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        EngineError::model_load_failed(format!("Failed to read config.json: {}", e))
    })?;

    let json: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        EngineError::model_load_failed(format!("Failed to parse config.json: {}", e))
    })?;

    let decoder = json.get("decoder").ok_or_else(|| {
        EngineError::model_load_failed("config.json missing 'decoder' section".to_string())
    })?;

    let defaults = ModelConfig::vidmuse_small();

    let num_hidden_layers = decoder
        .get("num_hidden_layers")
        .and_then(|v| v.as_u64())
        .unwrap_or(defaults.num_hidden_layers as u64) as u32;

    let num_attention_heads = decoder
        .get("num_attention_heads")
        .and_then(|v| v.as_u64())
        .unwrap_or(defaults.num_attention_heads as u64) as u32;

    let vocab_size = decoder
        .get("vocab_size")
        .and_then(|v| v.as_u64())
        .unwrap_or(defaults.vocab_size as u64) as u32;

    let pad_token_id = decoder
        .get("pad_token_id")
        .and_then(|v| v.as_i64())
        .unwrap_or(defaults.pad_token_id);

    let d_model = decoder
        .get("d_model")
        .and_then(|v| v.as_u64())
        .unwrap_or(defaults.d_model as u64) as u32;

    let frame_rate = json
        .get("frame_rate")
        .and_then(|v| v.as_u64())
        .unwrap_or(defaults.frame_rate as u64) as u32;

    let video_fps = json
        .get("video_fps")
        .and_then(|v| v.as_u64())
        .unwrap_or(defaults.video_fps as u64) as u32;

    let max_duration_sec = json
        .get("max_duration_sec")
        .and_then(|v| v.as_f64())
        .unwrap_or(defaults.max_duration_sec as f64) as f32;

    let wav_conditioner = json
        .get("wav_conditioner")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let config = ModelConfig {
        vocab_size,
        num_hidden_layers,
        num_attention_heads,
        d_model,
        d_kv: d_model / num_attention_heads.max(1),
        audio_channels: defaults.audio_channels,
        sample_rate: defaults.sample_rate,
        frame_rate,
        video_fps,
        codebooks: defaults.codebooks,
        pad_token_id,
        max_duration_sec,
    };

    Ok((config, wav_conditioner))
}

/// Detects model version from directory structure.
fn detect_model_version(model_dir: &Path) -> String {
    let dir_name = model_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    if dir_name.contains("fp16") {
        return "vidmuse-small-fp16-v1".to_string();
    }

    if dir_name.contains("fp32") {
        return "vidmuse-small-fp32-v1".to_string();
    }

    // Default
    "vidmuse-small-v1".to_string()
}

/// HuggingFace URLs for the vidmuse-small ONNX export.
pub const MODEL_URLS: &[(&str, &str)] = &[
    (
        "config.json",
        "https://huggingface.co/ZeyueT/VidMuse/resolve/main/onnx/config.json",
    ),
    (
        "tokenizer.json",
        "https://huggingface.co/ZeyueT/VidMuse/resolve/main/onnx/tokenizer.json",
    ),
    (
        "text_encoder.onnx",
        "https://huggingface.co/ZeyueT/VidMuse/resolve/main/onnx/text_encoder.onnx",
    ),
    (
        "video_encoder.onnx",
        "https://huggingface.co/ZeyueT/VidMuse/resolve/main/onnx/video_encoder.onnx",
    ),
    (
        "decoder_model.onnx",
        "https://huggingface.co/ZeyueT/VidMuse/resolve/main/onnx/decoder_model.onnx",
    ),
    (
        "decoder_with_past_model.onnx",
        "https://huggingface.co/ZeyueT/VidMuse/resolve/main/onnx/decoder_with_past_model.onnx",
    ),
    (
        "encodec_encode.onnx",
        "https://huggingface.co/ZeyueT/VidMuse/resolve/main/onnx/encodec_encode.onnx",
    ),
    (
        "encodec_decode.onnx",
        "https://huggingface.co/ZeyueT/VidMuse/resolve/main/onnx/encodec_decode.onnx",
    ),
];
