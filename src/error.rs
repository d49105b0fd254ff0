//! Error types for the vidmuse engine.
//!
//! Defines all error codes and types used throughout the engine for
//! consistent error handling and reporting.

use std::fmt;

/// Error codes returned by engine operations.
///
/// These codes allow callers to programmatically handle specific
/// error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// ONNX model files not found at expected path.
    /// Trigger: Model files missing from the model directory.
    ModelNotFound,

    /// Failed to load ONNX model into memory.
    /// Trigger: Corrupt file, wrong format, or OOM during load.
    ModelLoadFailed,

    /// Failed to download model from remote source.
    /// Trigger: Network error, disk full during download.
    ModelDownloadFailed,

    /// Model inference failed during generation.
    /// Trigger: Numerical instability, OOM during generation.
    ModelInferenceFailed,

    /// Invalid generation parameter combination.
    /// Trigger: extend_stride >= max_duration, non-positive duration.
    InvalidConfiguration,

    /// Conditioning tensor shapes disagree with the request.
    /// Trigger: melody/video count != description count, bad tensor rank.
    ShapeMismatch,

    /// Conditioning mode not supported by the loaded model.
    /// Trigger: melody conditioning without a wav conditioner, or a codec
    /// that returns a scale factor.
    UnsupportedConditioning,

    /// Continuation prompt exceeds the decoder's context budget.
    /// Trigger: prompt token length > min(duration, max_duration) * frame_rate.
    PromptTooLong,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ModelNotFound => "MODEL_NOT_FOUND",
            ErrorCode::ModelLoadFailed => "MODEL_LOAD_FAILED",
            ErrorCode::ModelDownloadFailed => "MODEL_DOWNLOAD_FAILED",
            ErrorCode::ModelInferenceFailed => "MODEL_INFERENCE_FAILED",
            ErrorCode::InvalidConfiguration => "INVALID_CONFIGURATION",
            ErrorCode::ShapeMismatch => "SHAPE_MISMATCH",
            ErrorCode::UnsupportedConditioning => "UNSUPPORTED_CONDITIONING",
            ErrorCode::PromptTooLong => "PROMPT_TOO_LONG",
        }
    }

    /// Returns a human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::ModelNotFound => "ONNX model files not found at expected path",
            ErrorCode::ModelLoadFailed => "Failed to load ONNX model into memory",
            ErrorCode::ModelDownloadFailed => "Failed to download model from remote source",
            ErrorCode::ModelInferenceFailed => "Model inference failed during generation",
            ErrorCode::InvalidConfiguration => "Invalid generation parameter combination",
            ErrorCode::ShapeMismatch => "Conditioning tensor shape does not match the request",
            ErrorCode::UnsupportedConditioning => {
                "Requested conditioning mode is not supported by the loaded model"
            }
            ErrorCode::PromptTooLong => "Continuation prompt exceeds the decoder context budget",
        }
    }

    /// Returns a recovery hint suggesting how to resolve this error.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ErrorCode::ModelNotFound => {
                "Run the engine once with network access to download models automatically, \
                 or pass --model-dir pointing at a directory with the VidMuse ONNX files"
            }
            ErrorCode::ModelLoadFailed => {
                "Check available memory (4GB+ recommended), verify model files are not corrupted, \
                 or delete the model directory and re-download"
            }
            ErrorCode::ModelDownloadFailed => {
                "Check internet connection, verify disk space (1GB+ required), \
                 or try again later if HuggingFace is unavailable"
            }
            ErrorCode::ModelInferenceFailed => {
                "Try reducing duration, or check system memory. \
                 If the issue persists, try CPU-only mode with VIDMUSE_DEVICE=cpu"
            }
            ErrorCode::InvalidConfiguration => {
                "extend_stride must be strictly less than the model's max duration \
                 and duration must be positive (e.g., duration 60, extend_stride 29.5)"
            }
            ErrorCode::ShapeMismatch => {
                "Supply exactly one conditioning tensor per description, with melody wavs \
                 shaped [C, T] and prompts shaped [C, T] or [B, C, T]"
            }
            ErrorCode::UnsupportedConditioning => {
                "Melody conditioning requires a model exported with a wav conditioner; \
                 use the video or text conditioning paths with this model"
            }
            ErrorCode::PromptTooLong => {
                "Shorten the continuation prompt so it fits within \
                 min(duration, max_duration) seconds of tokens"
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for engine operations.
#[derive(Debug)]
pub struct EngineError {
    /// The error code identifying the type of error.
    pub code: ErrorCode,
    /// Human-readable error message with context.
    pub message: String,
    /// Optional underlying cause of the error.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl EngineError {
    /// Creates a new EngineError with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new EngineError with an underlying cause.
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a MODEL_NOT_FOUND error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ModelNotFound,
            format!("Model files not found at: {}", path.into()),
        )
    }

    /// Creates a MODEL_LOAD_FAILED error.
    pub fn model_load_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ModelLoadFailed,
            format!("Failed to load model: {}", reason.into()),
        )
    }

    /// Creates a MODEL_DOWNLOAD_FAILED error.
    pub fn model_download_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ModelDownloadFailed,
            format!("Failed to download model: {}", reason.into()),
        )
    }

    /// Creates a MODEL_INFERENCE_FAILED error.
    pub fn model_inference_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ModelInferenceFailed,
            format!("Inference failed: {}", reason.into()),
        )
    }

    /// Creates an INVALID_CONFIGURATION error.
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidConfiguration,
            format!("Invalid configuration: {}", reason.into()),
        )
    }

    /// Creates a SHAPE_MISMATCH error.
    pub fn shape_mismatch(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ShapeMismatch,
            format!("Shape mismatch: {}", reason.into()),
        )
    }

    /// Creates an UNSUPPORTED_CONDITIONING error.
    pub fn unsupported_conditioning(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::UnsupportedConditioning,
            format!("Unsupported conditioning: {}", reason.into()),
        )
    }

    /// Creates a PROMPT_TOO_LONG error.
    pub fn prompt_too_long(prompt_len: usize, max_len: usize) -> Self {
        Self::new(
            ErrorCode::PromptTooLong,
            format!(
                "Prompt is {} tokens but the budget for this generation is {}",
                prompt_len, max_len
            ),
        )
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}. Recovery: {}",
            self.code,
            self.message,
            self.code.recovery_hint()
        )
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result type alias using EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_as_str() {
        assert_eq!(ErrorCode::ModelNotFound.as_str(), "MODEL_NOT_FOUND");
        assert_eq!(ErrorCode::InvalidConfiguration.as_str(), "INVALID_CONFIGURATION");
        assert_eq!(ErrorCode::ShapeMismatch.as_str(), "SHAPE_MISMATCH");
        assert_eq!(
            ErrorCode::UnsupportedConditioning.as_str(),
            "UNSUPPORTED_CONDITIONING"
        );
        assert_eq!(ErrorCode::PromptTooLong.as_str(), "PROMPT_TOO_LONG");
    }

    #[test]
    fn error_code_recovery_hints_not_empty() {
        // Ensure all error codes have non-empty recovery hints
        assert!(!ErrorCode::ModelNotFound.recovery_hint().is_empty());
        assert!(!ErrorCode::ModelLoadFailed.recovery_hint().is_empty());
        assert!(!ErrorCode::ModelDownloadFailed.recovery_hint().is_empty());
        assert!(!ErrorCode::ModelInferenceFailed.recovery_hint().is_empty());
        assert!(!ErrorCode::InvalidConfiguration.recovery_hint().is_empty());
        assert!(!ErrorCode::ShapeMismatch.recovery_hint().is_empty());
        assert!(!ErrorCode::UnsupportedConditioning.recovery_hint().is_empty());
        assert!(!ErrorCode::PromptTooLong.recovery_hint().is_empty());
    }

    #[test]
    fn engine_error_display() {
        let err = EngineError::prompt_too_long(2000, 1500);
        assert!(err.to_string().contains("PROMPT_TOO_LONG"));
        assert!(err.to_string().contains("2000"));
        assert!(err.to_string().contains("Recovery:"));
    }

    #[test]
    fn invalid_configuration_message() {
        let err = EngineError::invalid_configuration("extend_stride 30 >= max_duration 30");
        assert_eq!(err.code, ErrorCode::InvalidConfiguration);
        assert!(err.message.contains("extend_stride"));
    }
}
