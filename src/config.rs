//! Engine configuration module.
//!
//! Contains the runtime configuration for the vidmuse engine: execution
//! device and numeric precision selection, and model path configuration.
//! Device and precision form an explicit execution context fixed at session
//! construction; chunks of one generation never move between devices.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Execution device for ONNX inference.
///
/// Determines which hardware backend to use for model inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Automatically detect and use the best available device.
    /// Priority: Metal (macOS) > CUDA (Linux/Windows) > CPU
    #[default]
    Auto,

    /// Force CPU execution.
    /// Slowest but universally available.
    Cpu,

    /// Use CUDA for NVIDIA GPU acceleration.
    /// Requires CUDA toolkit and compatible GPU.
    Cuda,

    /// Use Metal/CoreML for Apple Silicon acceleration.
    /// Only available on macOS with Apple Silicon.
    Metal,
}

impl Device {
    /// Returns the string representation of the device.
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Auto => "auto",
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
            Device::Metal => "metal",
        }
    }

    /// Parses a device from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(Device::Auto),
            "cpu" => Some(Device::Cpu),
            "cuda" => Some(Device::Cuda),
            "metal" | "coreml" => Some(Device::Metal),
            _ => None,
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Numeric precision for model execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// Infer from the model directory (fp16 exports are named as such).
    #[default]
    Auto,

    /// Half precision. Smaller and faster on accelerators.
    Fp16,

    /// Full precision. Safest on CPU.
    Fp32,
}

impl Precision {
    /// Returns the string representation of the precision.
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Auto => "auto",
            Precision::Fp16 => "fp16",
            Precision::Fp32 => "fp32",
        }
    }

    /// Parses a precision from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(Precision::Auto),
            "fp16" | "half" => Some(Precision::Fp16),
            "fp32" | "float" => Some(Precision::Fp32),
            _ => None,
        }
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Execution context passed to the model loader: device plus precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExecutionContext {
    /// Execution device for inference.
    pub device: Device,
    /// Numeric precision for model execution.
    pub precision: Precision,
}

/// Runtime configuration for the engine.
///
/// Typically loaded from command-line arguments or environment variables
/// at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the directory containing the VidMuse ONNX model files.
    /// If None, uses the platform-specific default cache location.
    pub model_path: Option<PathBuf>,

    /// Execution device for inference.
    pub device: Device,

    /// Numeric precision for model execution.
    pub precision: Precision,

    /// Number of threads for intra-op parallelism in ONNX Runtime.
    /// If None, uses ONNX Runtime's default (typically number of CPU cores).
    pub threads: Option<u32>,
}

impl EngineConfig {
    /// Creates a new EngineConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an EngineConfig from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `VIDMUSE_MODEL_PATH` - Path to the model directory
    /// - `VIDMUSE_DEVICE` - Device selection (auto, cpu, cuda, metal)
    /// - `VIDMUSE_PRECISION` - Precision selection (auto, fp16, fp32)
    /// - `VIDMUSE_THREADS` - Number of threads for CPU execution
    ///
    /// Falls back to defaults for unset variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("VIDMUSE_MODEL_PATH") {
            config.model_path = Some(PathBuf::from(path));
        }

        if let Ok(device_str) = std::env::var("VIDMUSE_DEVICE") {
            if let Some(device) = Device::parse(&device_str) {
                config.device = device;
            }
        }

        if let Ok(precision_str) = std::env::var("VIDMUSE_PRECISION") {
            if let Some(precision) = Precision::parse(&precision_str) {
                config.precision = precision;
            }
        }

        if let Ok(threads_str) = std::env::var("VIDMUSE_THREADS") {
            if let Ok(threads) = threads_str.parse::<u32>() {
                if threads > 0 {
                    config.threads = Some(threads);
                }
            }
        }

        config
    }

    /// Returns the effective model path, using platform defaults if not specified.
    pub fn effective_model_path(&self) -> PathBuf {
        if let Some(ref path) = self.model_path {
            path.clone()
        } else {
            default_model_path()
        }
    }

    /// Returns the execution context for the model loader.
    pub fn execution_context(&self) -> ExecutionContext {
        ExecutionContext {
            device: self.device,
            precision: self.precision,
        }
    }

    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails, None otherwise.
    pub fn validate(&self) -> Option<String> {
        // Validate thread count if specified
        if let Some(threads) = self.threads {
            if threads == 0 {
                return Some("threads must be > 0".to_string());
            }
            if threads > 256 {
                return Some(format!("threads too high: {} (max 256)", threads));
            }
        }

        None
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            device: Device::Auto,
            precision: Precision::Auto,
            threads: None,
        }
    }
}

/// Returns the platform-specific default model storage path.
///
/// Uses the `directories` crate to find appropriate locations:
/// - macOS: ~/Library/Caches/vidmuse/models
/// - Linux: ~/.cache/vidmuse/models
/// - Windows: C:\Users\<user>\AppData\Local\vidmuse\cache\models
pub fn default_model_path() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "vidmuse") {
        proj_dirs.cache_dir().join("models")
    } else {
        // Fallback to current directory
        PathBuf::from("./models")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_parsing() {
        assert_eq!(Device::parse("auto"), Some(Device::Auto));
        assert_eq!(Device::parse("CPU"), Some(Device::Cpu));
        assert_eq!(Device::parse("cuda"), Some(Device::Cuda));
        assert_eq!(Device::parse("metal"), Some(Device::Metal));
        assert_eq!(Device::parse("coreml"), Some(Device::Metal));
        assert_eq!(Device::parse("invalid"), None);
    }

    #[test]
    fn precision_parsing() {
        assert_eq!(Precision::parse("auto"), Some(Precision::Auto));
        assert_eq!(Precision::parse("FP16"), Some(Precision::Fp16));
        assert_eq!(Precision::parse("half"), Some(Precision::Fp16));
        assert_eq!(Precision::parse("fp32"), Some(Precision::Fp32));
        assert_eq!(Precision::parse("int8"), None);
    }

    #[test]
    fn device_display() {
        assert_eq!(Device::Auto.to_string(), "auto");
        assert_eq!(Device::Cpu.to_string(), "cpu");
    }

    #[test]
    fn config_validation() {
        let mut config = EngineConfig::new();
        assert!(config.validate().is_none());

        config.threads = Some(0);
        assert!(config.validate().is_some());

        config.threads = Some(4);
        assert!(config.validate().is_none());
    }

    #[test]
    fn effective_path_is_never_empty() {
        let config = EngineConfig::new();
        assert!(!config.effective_model_path().as_os_str().is_empty());
    }

    #[test]
    fn execution_context_mirrors_config() {
        let mut config = EngineConfig::new();
        config.device = Device::Cpu;
        config.precision = Precision::Fp32;
        let context = config.execution_context();
        assert_eq!(context.device, Device::Cpu);
        assert_eq!(context.precision, Precision::Fp32);
    }
}
