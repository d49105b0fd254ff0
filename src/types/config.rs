//! ModelConfig type for VidMuse model parameters.
//!
//! Contains the configuration parameters for the VidMuse ONNX model
//! ensemble, matching the model's architecture requirements.

use serde::{Deserialize, Serialize};

/// Configuration parameters for the VidMuse model architecture.
///
/// These values are derived from the model's config.json and are required
/// for proper tensor shape allocation and inference. The rate fields tie
/// the two timelines together: audio tokens advance at `frame_rate` per
/// second while video conditioning frames advance at `video_fps` per second.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Token vocabulary size (typically 2048).
    pub vocab_size: u32,

    /// Number of decoder transformer layers.
    pub num_hidden_layers: u32,

    /// Number of attention heads in each layer.
    pub num_attention_heads: u32,

    /// Hidden dimension size (embedding dimension).
    pub d_model: u32,

    /// Key/value dimension per attention head.
    /// Typically d_model / num_attention_heads.
    pub d_kv: u32,

    /// Number of audio channels (always 1 for mono).
    pub audio_channels: u32,

    /// Audio sample rate in Hz (always 32000).
    pub sample_rate: u32,

    /// Audio token frames emitted per second of output.
    pub frame_rate: u32,

    /// Video conditioning frames consumed per second of output.
    pub video_fps: u32,

    /// Number of EnCodec codebooks (always 4).
    pub codebooks: u32,

    /// Padding token ID for the decoder.
    pub pad_token_id: i64,

    /// Maximum duration the decoder can generate in one call, in seconds.
    pub max_duration_sec: f32,
}

impl ModelConfig {
    /// Creates a ModelConfig for the vidmuse-small model.
    ///
    /// This is the default configuration for the MusicGen-small derived
    /// checkpoint with the 2 fps video conditioning tower.
    pub fn vidmuse_small() -> Self {
        Self {
            vocab_size: 2048,
            num_hidden_layers: 24,
            num_attention_heads: 16,
            d_model: 1024,
            d_kv: 64, // 1024 / 16 = 64
            audio_channels: 1,
            sample_rate: 32000,
            frame_rate: 50,
            video_fps: 2,
            codebooks: 4,
            pad_token_id: 2048, // vocab_size is used as pad token
            max_duration_sec: 30.0,
        }
    }

    /// Validates the configuration for consistency.
    ///
    /// Returns an error message if validation fails, None otherwise.
    pub fn validate(&self) -> Option<String> {
        if self.vocab_size == 0 {
            return Some("vocab_size must be > 0".to_string());
        }

        if self.num_hidden_layers == 0 {
            return Some("num_hidden_layers must be > 0".to_string());
        }

        if self.num_attention_heads == 0 {
            return Some("num_attention_heads must be > 0".to_string());
        }

        if self.d_model == 0 {
            return Some("d_model must be > 0".to_string());
        }

        // d_kv should typically be d_model / num_attention_heads
        let expected_d_kv = self.d_model / self.num_attention_heads;
        if self.d_kv != expected_d_kv {
            return Some(format!(
                "d_kv ({}) should be d_model / num_attention_heads ({})",
                self.d_kv, expected_d_kv
            ));
        }

        if self.frame_rate == 0 {
            return Some("frame_rate must be > 0".to_string());
        }

        if self.video_fps == 0 {
            return Some("video_fps must be > 0".to_string());
        }

        if self.codebooks != 4 {
            return Some(format!("codebooks must be 4, got {}", self.codebooks));
        }

        if self.max_duration_sec <= 0.0 {
            return Some(format!(
                "max_duration_sec must be > 0, got {}",
                self.max_duration_sec
            ));
        }

        None
    }

    /// Number of audio token frames for a duration in seconds.
    pub fn total_tokens(&self, duration_sec: f64) -> usize {
        (duration_sec * self.frame_rate as f64).round() as usize
    }

    /// Number of video conditioning frames for a duration in seconds.
    pub fn video_frames(&self, duration_sec: f64) -> usize {
        (duration_sec * self.video_fps as f64).round() as usize
    }

    /// Maximum continuation prompt length in tokens for a requested duration.
    ///
    /// The prompt must fit within one decoder context, or within the whole
    /// request when that is shorter.
    pub fn max_prompt_tokens(&self, duration_sec: f64) -> usize {
        self.total_tokens(duration_sec.min(self.max_duration_sec as f64))
    }

    /// Largest local video window the decoder accepts, in frames.
    pub fn max_video_window(&self) -> usize {
        self.video_frames(self.max_duration_sec as f64)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::vidmuse_small()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vidmuse_small_config() {
        let config = ModelConfig::vidmuse_small();
        assert_eq!(config.vocab_size, 2048);
        assert_eq!(config.num_hidden_layers, 24);
        assert_eq!(config.sample_rate, 32000);
        assert_eq!(config.frame_rate, 50);
        assert_eq!(config.video_fps, 2);
        assert_eq!(config.codebooks, 4);
        assert!(config.validate().is_none());
    }

    #[test]
    fn config_validation() {
        let mut config = ModelConfig::vidmuse_small();
        config.d_kv = 128; // Wrong value
        assert!(config.validate().is_some());

        let mut config = ModelConfig::vidmuse_small();
        config.video_fps = 0;
        assert!(config.validate().is_some());
    }

    #[test]
    fn rate_conversions() {
        let config = ModelConfig::vidmuse_small();
        assert_eq!(config.total_tokens(30.0), 1500);
        assert_eq!(config.total_tokens(29.5), 1475);
        assert_eq!(config.video_frames(29.5), 59);
        assert_eq!(config.max_video_window(), 60);
    }

    #[test]
    fn prompt_budget_clamped_by_duration() {
        let config = ModelConfig::vidmuse_small();
        // Budget is one full context for long requests...
        assert_eq!(config.max_prompt_tokens(60.0), 1500);
        // ...but only the request itself for short ones.
        assert_eq!(config.max_prompt_tokens(10.0), 500);
    }
}
