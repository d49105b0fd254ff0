//! CLI argument parser.
//!
//! Command-line interface for running generation without embedding the
//! library: text, video, melody-free continuation, and embedding extraction.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::{Device, Precision};

/// Device argument wrapper for clap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DeviceArg {
    /// Pick the best available backend
    #[default]
    Auto,
    /// Force CPU execution
    Cpu,
    /// NVIDIA GPU via CUDA
    Cuda,
    /// Apple Silicon via Metal/CoreML
    Metal,
}

impl From<DeviceArg> for Device {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Auto => Device::Auto,
            DeviceArg::Cpu => Device::Cpu,
            DeviceArg::Cuda => Device::Cuda,
            DeviceArg::Metal => Device::Metal,
        }
    }
}

/// Precision argument wrapper for clap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum PrecisionArg {
    /// Infer from the model directory name
    #[default]
    Auto,
    /// Half precision
    Fp16,
    /// Full precision
    Fp32,
}

impl From<PrecisionArg> for Precision {
    fn from(arg: PrecisionArg) -> Self {
        match arg {
            PrecisionArg::Auto => Precision::Auto,
            PrecisionArg::Fp16 => Precision::Fp16,
            PrecisionArg::Fp32 => Precision::Fp32,
        }
    }
}

/// vidmuse: long-form video-to-music generation
#[derive(Parser, Debug)]
#[command(name = "vidmuse")]
#[command(about = "Long-form video-to-music generation with windowed autoregressive decoding")]
#[command(version)]
pub struct Cli {
    /// Text prompt describing the music to generate
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Video feature manifest (JSON) for the local conditioning window
    #[arg(long)]
    pub video: Option<PathBuf>,

    /// Video feature manifest for the global conditioning group
    /// (defaults to the local features when omitted)
    #[arg(long)]
    pub video_global: Option<PathBuf>,

    /// WAV file to continue from
    #[arg(long)]
    pub continue_wav: Option<PathBuf>,

    /// Duration of audio to generate in seconds
    #[arg(short, long, default_value = "30.0")]
    pub duration: f64,

    /// Stride in seconds when extending past the model's context window
    #[arg(long, default_value = "29.5")]
    pub stride: f64,

    /// Output WAV file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path to directory containing ONNX model files
    #[arg(short, long)]
    pub model_dir: Option<PathBuf>,

    /// Random seed for reproducible generation
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Use greedy (argmax) decoding instead of sampling
    #[arg(long)]
    pub greedy: bool,

    /// Top-k sampling cutoff
    #[arg(long, default_value = "250")]
    pub top_k: usize,

    /// Nucleus sampling threshold (0 disables, takes precedence over top-k)
    #[arg(long, default_value = "0.0")]
    pub top_p: f32,

    /// Softmax temperature
    #[arg(long, default_value = "1.0")]
    pub temperature: f32,

    /// Classifier-free guidance coefficient
    #[arg(long, default_value = "3.0")]
    pub cfg_coef: f32,

    /// Run guidance as two forward passes instead of one batched pass
    #[arg(long)]
    pub two_step_cfg: bool,

    /// Execution device
    #[arg(long, value_enum, default_value_t = DeviceArg::Auto)]
    pub device: DeviceArg,

    /// Numeric precision
    #[arg(long, value_enum, default_value_t = PrecisionArg::Auto)]
    pub precision: PrecisionArg,

    /// Write the video conditioning embedding instead of generating audio
    #[arg(long)]
    pub embedding: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Returns true when any generation input was supplied.
    pub fn has_input(&self) -> bool {
        self.prompt.is_some() || self.video.is_some() || self.continue_wav.is_some()
    }

    /// Returns the effective output path.
    ///
    /// Defaults to "output.wav" in the current directory if not specified.
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from("output.wav"))
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_match_generation_params() {
        let cli = Cli::parse_from(["vidmuse", "--prompt", "test"]);
        assert_eq!(cli.duration, 30.0);
        assert_eq!(cli.stride, 29.5);
        assert_eq!(cli.top_k, 250);
        assert_eq!(cli.top_p, 0.0);
        assert_eq!(cli.temperature, 1.0);
        assert_eq!(cli.cfg_coef, 3.0);
        assert!(!cli.two_step_cfg);
        assert!(!cli.greedy);
    }

    #[test]
    fn input_detection() {
        let with_prompt = Cli::parse_from(["vidmuse", "--prompt", "test"]);
        assert!(with_prompt.has_input());

        let bare = Cli::parse_from(["vidmuse"]);
        assert!(!bare.has_input());
    }

    #[test]
    fn output_path_default() {
        let cli = Cli::parse_from(["vidmuse", "--prompt", "test"]);
        assert_eq!(cli.output_path(), PathBuf::from("output.wav"));
    }

    #[test]
    fn device_and_precision_convert() {
        let cli = Cli::parse_from([
            "vidmuse",
            "--prompt",
            "test",
            "--device",
            "cpu",
            "--precision",
            "fp32",
        ]);
        assert_eq!(Device::from(cli.device), Device::Cpu);
        assert_eq!(Precision::from(cli.precision), Precision::Fp32);
    }

}
