//! Text encoder wrapper.
//!
//! Handles tokenization and T5 encoding for text descriptions. Descriptions
//! are optional per sample; absent ones are encoded as the empty string so
//! the conditioning batch stays rectangular.

use std::path::Path;

use half::f16;
use ndarray::{Array, Array3, Ix3, IxDyn};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use crate::error::{EngineError, Result};

/// Text conditioning encoder combining tokenizer and T5 session.
pub struct TextEncoder {
    tokenizer: Tokenizer,
    text_encoder: Session,
}

impl TextEncoder {
    /// Creates a new text encoder from a model directory.
    ///
    /// Loads `tokenizer.json` and `text_encoder.onnx` from the given directory.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");
        let encoder_path = model_dir.join("text_encoder.onnx");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            EngineError::model_load_failed(format!("Failed to load tokenizer: {}", e))
        })?;

        tokenizer
            .with_padding(None)
            .with_truncation(None)
            .map_err(|e| {
                EngineError::model_load_failed(format!("Failed to configure tokenizer: {}", e))
            })?;

        let text_encoder = Session::builder()
            .map_err(|e| EngineError::model_load_failed(format!("Failed to create session: {}", e)))?
            .commit_from_file(&encoder_path)
            .map_err(|e| {
                EngineError::model_load_failed(format!("Failed to load text_encoder.onnx: {}", e))
            })?;

        Ok(Self {
            tokenizer,
            text_encoder,
        })
    }

    /// Encodes one description into `[1, seq_len, d_model]` hidden states.
    ///
    /// `None` descriptions encode as the empty string.
    pub fn encode(&mut self, description: Option<&str>) -> Result<Array3<f32>> {
        let text = description.unwrap_or("");
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| {
                EngineError::model_inference_failed(format!("Tokenization failed: {}", e))
            })?
            .get_ids()
            .iter()
            .map(|e| *e as i64)
            .collect::<Vec<_>>();

        let tokens_len = tokens.len();

        let input_ids = Tensor::from_array(([1, tokens_len], tokens)).map_err(|e| {
            EngineError::model_inference_failed(format!("Failed to create input tensor: {}", e))
        })?;

        let attention_mask_data: Vec<i64> = vec![1; tokens_len];
        let attention_mask =
            Tensor::from_array(([1, tokens_len], attention_mask_data)).map_err(|e| {
                EngineError::model_inference_failed(format!(
                    "Failed to create attention mask: {}",
                    e
                ))
            })?;

        let mut output = self
            .text_encoder
            .run(ort::inputs![input_ids, attention_mask])
            .map_err(|e| {
                EngineError::model_inference_failed(format!(
                    "Text encoder inference failed: {}",
                    e
                ))
            })?;

        let last_hidden_state = output.remove("last_hidden_state").ok_or_else(|| {
            EngineError::model_inference_failed("last_hidden_state not found in output")
        })?;

        extract_hidden(&last_hidden_state)
    }
}

/// Extracts a `[batch, seq, dim]` hidden-state tensor as f32.
pub(crate) fn extract_hidden(value: &ort::value::DynValue) -> Result<Array3<f32>> {
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
                "Hidden states must be f32 or f16",
            ));
        };

    let arr = Array::from_shape_vec(IxDyn(&shape), data).map_err(|e| {
        EngineError::model_inference_failed(format!("Failed to create array: {}", e))
    })?;

    arr.into_dimensionality::<Ix3>().map_err(|e| {
        EngineError::model_inference_failed(format!("Expected 3D hidden states: {}", e))
    })
}
