//! Audio format conversion for prompt and melody inputs.
//!
//! Continuation prompts and melody waveforms arrive at arbitrary sample rates
//! and channel counts; the model wants its native format (mono 32 kHz for the
//! small checkpoint). Resampling uses rubato's sinc resampler.

use ndarray::{Array3, Axis};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{EngineError, Result};

/// Converts a `[batch, channels, time]` waveform to the target rate and
/// channel count.
///
/// Channel handling mirrors the usual conventions: downmix to mono by
/// averaging, upmix from mono by duplication; any other channel change is a
/// shape error.
pub fn convert_audio(
    wav: &Array3<f32>,
    from_rate: u32,
    to_rate: u32,
    to_channels: usize,
) -> Result<Array3<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(EngineError::shape_mismatch("sample rates must be nonzero"));
    }

    let remixed = remix_channels(wav, to_channels)?;
    if from_rate == to_rate {
        return Ok(remixed);
    }

    let (batch, channels, in_len) = remixed.dim();
    let out_len = resampled_len(in_len, from_rate, to_rate);
    let mut out = Array3::<f32>::zeros((batch, channels, out_len));

    for b in 0..batch {
        for c in 0..channels {
            let input: Vec<f32> = remixed.index_axis(Axis(0), b).row(c).to_vec();
            let output = resample_channel(&input, from_rate, to_rate)?;
            for (t, sample) in output.iter().take(out_len).enumerate() {
                out[[b, c, t]] = *sample;
            }
        }
    }

    Ok(out)
}

/// Expected output length after resampling.
pub fn resampled_len(in_len: usize, from_rate: u32, to_rate: u32) -> usize {
    (in_len as u64 * to_rate as u64 / from_rate as u64) as usize
}

/// Resamples one mono channel.
fn resample_channel(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        to_rate as f64 / from_rate as f64,
        2.0,
        params,
        samples.len(),
        1,
    )
    .map_err(|e| {
        EngineError::model_inference_failed(format!("Failed to build resampler: {}", e))
    })?;

    let input = vec![samples.to_vec()];
    let output = resampler
        .process(&input, None)
        .map_err(|e| EngineError::model_inference_failed(format!("Resampling failed: {}", e)))?;

    Ok(output.into_iter().next().unwrap_or_default())
}

/// Remixes a `[batch, channels, time]` waveform to the target channel count.
fn remix_channels(wav: &Array3<f32>, to_channels: usize) -> Result<Array3<f32>> {
    let (batch, channels, time) = wav.dim();

    if to_channels == 0 {
        return Err(EngineError::shape_mismatch("target channels must be > 0"));
    }
    if channels == to_channels {
        return Ok(wav.clone());
    }

    if to_channels == 1 {
        // Downmix by averaging.
        let mut out = Array3::<f32>::zeros((batch, 1, time));
        for b in 0..batch {
            for t in 0..time {
                let mut acc = 0.0f32;
                for c in 0..channels {
                    acc += wav[[b, c, t]];
                }
                out[[b, 0, t]] = acc / channels as f32;
            }
        }
        return Ok(out);
    }

    if channels == 1 {
        // Upmix by duplication.
        let mut out = Array3::<f32>::zeros((batch, to_channels, time));
        for b in 0..batch {
            for c in 0..to_channels {
                for t in 0..time {
                    out[[b, c, t]] = wav[[b, 0, t]];
                }
            }
        }
        return Ok(out);
    }

    Err(EngineError::shape_mismatch(format!(
        "cannot remix {} channels to {}",
        channels, to_channels
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_same_channels_is_passthrough() {
        let wav = Array3::from_shape_fn((1, 1, 100), |(_, _, t)| t as f32);
        let out = convert_audio(&wav, 32000, 32000, 1).unwrap();
        assert_eq!(out, wav);
    }

    #[test]
    fn stereo_downmix_averages() {
        let mut wav = Array3::<f32>::zeros((1, 2, 4));
        wav.slice_mut(ndarray::s![0, 0, ..]).fill(1.0);
        wav.slice_mut(ndarray::s![0, 1, ..]).fill(3.0);
        let out = convert_audio(&wav, 32000, 32000, 1).unwrap();
        assert_eq!(out.dim(), (1, 1, 4));
        assert_eq!(out[[0, 0, 0]], 2.0);
    }

    #[test]
    fn mono_upmix_duplicates() {
        let wav = Array3::from_shape_fn((1, 1, 4), |(_, _, t)| t as f32);
        let out = convert_audio(&wav, 32000, 32000, 2).unwrap();
        assert_eq!(out.dim(), (1, 2, 4));
        assert_eq!(out[[0, 0, 3]], out[[0, 1, 3]]);
    }

    #[test]
    fn unsupported_remix_fails() {
        let wav = Array3::<f32>::zeros((1, 4, 8));
        assert!(convert_audio(&wav, 32000, 32000, 2).is_err());
    }

    #[test]
    fn downsample_halves_length() {
        let wav = Array3::<f32>::from_shape_fn((1, 1, 44100), |(_, _, t)| {
            (t as f32 * 0.01).sin()
        });
        let out = convert_audio(&wav, 44100, 22050, 1).unwrap();
        assert_eq!(out.dim().2, 22050);
    }

    #[test]
    fn resampled_len_ratio() {
        assert_eq!(resampled_len(44100, 44100, 32000), 32000);
        assert_eq!(resampled_len(16000, 16000, 32000), 32000);
    }
}
