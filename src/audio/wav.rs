//! WAV file writer for audio output.
//!
//! Writes audio samples to WAV format using the hound crate.

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::{EngineError, Result};

/// Audio sample rate of the generated output (32kHz).
pub const SAMPLE_RATE: u32 = 32000;

/// Number of audio channels written (stereo file, mono model output duplicated).
pub const CHANNELS: u16 = 2;

/// Writes audio samples to a WAV file.
///
/// # Arguments
///
/// * `samples` - Audio samples as f32 values
/// * `path` - Output file path
/// * `sample_rate` - Sample rate in Hz (typically 32000)
pub fn write_wav(samples: &[f32], path: &Path, sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: CHANNELS,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec).map_err(|e| {
        EngineError::model_inference_failed(format!("Failed to create WAV file: {}", e))
    })?;

    for sample in samples {
        // Write same sample to both left and right channels
        writer.write_sample(*sample).map_err(|e| {
            EngineError::model_inference_failed(format!("Failed to write sample: {}", e))
        })?;
        writer.write_sample(*sample).map_err(|e| {
            EngineError::model_inference_failed(format!("Failed to write sample: {}", e))
        })?;
    }

    writer.finalize().map_err(|e| {
        EngineError::model_inference_failed(format!("Failed to finalize WAV file: {}", e))
    })?;

    Ok(())
}

/// Reads a WAV file into `[1, channels, time]` f32 samples plus its rate.
///
/// Integer formats are normalized into [-1, 1]. Used for continuation and
/// melody inputs on the CLI path.
pub fn read_wav(path: &Path) -> Result<(ndarray::Array3<f32>, u32)> {
    let mut reader = hound::WavReader::open(path).map_err(|e| {
        EngineError::model_load_failed(format!("Failed to open WAV {}: {}", path.display(), e))
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| {
                EngineError::model_load_failed(format!("Failed to read WAV samples: {}", e))
            })?,
        SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| {
                    EngineError::model_load_failed(format!("Failed to read WAV samples: {}", e))
                })?
        }
    };

    let frames = interleaved.len() / channels;
    let mut out = ndarray::Array3::<f32>::zeros((1, channels, frames));
    for (i, sample) in interleaved.iter().enumerate() {
        out[[0, i % channels, i / channels]] = *sample;
    }

    Ok((out, spec.sample_rate))
}

/// Calculates the duration of audio in seconds from sample count.
pub fn samples_to_duration(sample_count: usize, sample_rate: u32) -> f32 {
    sample_count as f32 / sample_rate as f32
}
