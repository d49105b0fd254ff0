//! EnCodec audio codec wrapper.
//!
//! Encodes waveforms into discrete token sequences (for continuation prompts)
//! and decodes token sequences back into audio. The engine requires a
//! scale-free codec: `encode` surfaces the exported scale output when the
//! graph produces one, and callers reject it.

use std::path::Path;

use half::f16;
use ndarray::{Array, Array3, Ix3, IxDyn};
use ort::session::Session;
use ort::value::{DynValue, Tensor};

use crate::error::{EngineError, Result};
use crate::types::TokenSequence;

use super::AudioCodec;

/// EnCodec encode/decode session pair.
pub struct EncodecCodec {
    encoder: Session,
    decoder: Session,
}

impl EncodecCodec {
    /// Loads the codec from a directory.
    ///
    /// Expects `encodec_encode.onnx` and `encodec_decode.onnx` in the directory.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let encoder = load_session(&model_dir.join("encodec_encode.onnx"))?;
        let decoder = load_session(&model_dir.join("encodec_decode.onnx"))?;
        Ok(Self { encoder, decoder })
    }
}

impl AudioCodec for EncodecCodec {
    fn encode(&mut self, waveform: &Array3<f32>) -> Result<(TokenSequence, Option<f32>)> {
        let (batch, channels, time) = waveform.dim();
        let data: Vec<f32> = waveform.iter().copied().collect();
        let input = Tensor::from_array((vec![batch, channels, time], data)).map_err(|e| {
            EngineError::model_inference_failed(format!("Failed to create audio tensor: {}", e))
        })?;

        let mut outputs = self.encoder.run(ort::inputs![input]).map_err(|e| {
            EngineError::model_inference_failed(format!("Audio codec encode failed: {}", e))
        })?;

        let codes = outputs.remove("audio_codes").ok_or_else(|| {
            EngineError::model_inference_failed("audio_codes not found in output")
        })?;
        let tokens = extract_codes(&codes)?;

        // Some codec exports carry an audio_scales output; a populated one
        // means the waveform was normalized before quantization.
        let scale = match outputs.remove("audio_scales") {
            Some(scales) => extract_scale(&scales),
            None => None,
        };

        Ok((tokens, scale))
    }

    fn decode(&mut self, tokens: &TokenSequence, scale: Option<f32>) -> Result<Array3<f32>> {
        if scale.is_some() {
            return Err(EngineError::unsupported_conditioning(
                "decode with a scale factor is not supported by this codec",
            ));
        }

        let frames = tokens.codebook_frames();
        if frames.is_empty() {
            return Ok(Array3::zeros((tokens.batch().max(1), 1, 0)));
        }

        let codebooks = tokens.codebooks();
        let seq_len = frames.len();

        // [T, K] frames transposed into the [1, 1, K, T] layout EnCodec expects.
        let mut transposed = vec![0i64; codebooks * seq_len];
        for (i, frame) in frames.iter().enumerate() {
            for (j, token) in frame.iter().enumerate() {
                transposed[j * seq_len + i] = *token;
            }
        }

        let input_tensor =
            Tensor::from_array((vec![1usize, 1, codebooks, seq_len], transposed)).map_err(|e| {
                EngineError::model_inference_failed(format!(
                    "Failed to create token tensor: {}",
                    e
                ))
            })?;

        let mut outputs = self.decoder.run(ort::inputs![input_tensor]).map_err(|e| {
            EngineError::model_inference_failed(format!("Audio codec decode failed: {}", e))
        })?;

        let audio_values: DynValue = outputs.remove("audio_values").ok_or_else(|| {
            EngineError::model_inference_failed("audio_values not found in output")
        })?;

        extract_audio(&audio_values)
    }
}

fn load_session(path: &Path) -> Result<Session> {
    Session::builder()
        .map_err(|e| EngineError::model_load_failed(format!("Failed to create session: {}", e)))?
        .commit_from_file(path)
        .map_err(|e| {
            EngineError::model_load_failed(format!("Failed to load {}: {}", path.display(), e))
        })
}

/// Extracts `audio_codes` into a `[batch, codebooks, time]` sequence.
///
/// Accepts the 4-D `[frames, batch, codebooks, time]` layout some exports use
/// (with a single frame) as well as plain 3-D.
fn extract_codes(value: &DynValue) -> Result<TokenSequence> {
    let (shape, data) = value.try_extract_tensor::<i64>().map_err(|e| {
        EngineError::model_inference_failed(format!("Failed to extract audio codes: {}", e))
    })?;
    let shape: Vec<usize> = shape.iter().map(|&x| x as usize).collect();

    let shape3 = match shape.len() {
        3 => (shape[0], shape[1], shape[2]),
        4 if shape[0] == 1 => (shape[1], shape[2], shape[3]),
        _ => {
            return Err(EngineError::shape_mismatch(format!(
                "audio codes must be [B, K, T] or [1, B, K, T], got {:?}",
                shape
            )))
        }
    };

    let arr = Array::from_shape_vec(IxDyn(&[shape3.0, shape3.1, shape3.2]), data.to_vec())
        .map_err(|e| EngineError::model_inference_failed(format!("Failed to create array: {}", e)))?
        .into_dimensionality::<Ix3>()
        .map_err(|e| {
            EngineError::model_inference_failed(format!("Expected 3D audio codes: {}", e))
        })?;

    Ok(TokenSequence::new(arr))
}

/// Extracts a scale factor when the output actually carries one.
fn extract_scale(value: &DynValue) -> Option<f32> {
    if let Ok((_, data)) = value.try_extract_tensor::<f32>() {
        return data.first().copied();
    }
    if let Ok((_, data)) = value.try_extract_tensor::<f16>() {
        return data.first().map(|e| f32::from(*e));
    }
    None
}

/// Extracts decoded audio as `[batch, channels, time]`, f16 or f32.
fn extract_audio(value: &DynValue) -> Result<Array3<f32>> {
    let (shape, data): (Vec<usize>, Vec<f32>) =
        if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
            (shape.iter().map(|&x| x as usize).collect(), data.to_vec())
        } else if let Ok((shape, data)) = value.try_extract_tensor::<f16>() {
            (
                shape.iter().map(|&x| x as usize).collect(),
                data.iter().map(|e| f32::from(*e)).collect(),
            )
        } else {
            return Err(EngineError::model_inference_failed(
                "Audio values must be either f16 or f32",
            ));
        };

    if shape.len() != 3 {
        return Err(EngineError::shape_mismatch(format!(
            "decoded audio must be [B, C, T], got {:?}",
            shape
        )));
    }

    Array::from_shape_vec(IxDyn(&shape), data)
        .map_err(|e| EngineError::model_inference_failed(format!("Failed to create array: {}", e)))?
        .into_dimensionality::<Ix3>()
        .map_err(|e| EngineError::model_inference_failed(format!("Expected 3D audio: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_transpose_layout() {
        let tokens = TokenSequence::from_codebook_frames(&[[1i64, 2, 3, 4], [5, 6, 7, 8]]);
        let frames = tokens.codebook_frames();

        let codebooks = tokens.codebooks();
        let seq_len = frames.len();
        let mut transposed = vec![0i64; codebooks * seq_len];
        for (i, frame) in frames.iter().enumerate() {
            for (j, token) in frame.iter().enumerate() {
                transposed[j * seq_len + i] = *token;
            }
        }

        // After transpose: codebook-major rows.
        assert_eq!(transposed, vec![1, 5, 2, 6, 3, 7, 4, 8]);
    }
}
