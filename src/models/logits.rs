//! Logits processing for the decoder output.
//!
//! Handles classifier-free guidance and the sampling strategies the engine
//! exposes: argmax decoding, top-k sampling, and nucleus (top-p) sampling
//! with temperature. Sampling runs on a ChaCha RNG so a fixed seed gives
//! reproducible generations.

use std::fmt::{Debug, Formatter};
use std::ops::{Deref, DerefMut};

use half::f16;
use ndarray::{s, Array, Array2, Axis, Ix3, IxDyn};
use ort::tensor::ArrayExtensions;
use ort::value::DynValue;
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{EngineError, Result};
use crate::types::SamplingParams;

/// Creates the sampling RNG, seeded when reproducibility was requested.
pub fn sampling_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Wrapper around a 2D logits array with processing methods.
pub struct Logits(Array2<f32>);

impl Deref for Logits {
    type Target = Array2<f32>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Logits {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Debug for Logits {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Logits({:?})", self.0.dim())
    }
}

impl Logits {
    /// Wraps an existing `[batch, vocab]` array.
    pub fn from_array(arr: Array2<f32>) -> Self {
        Self(arr)
    }

    /// Creates Logits from a 3D DynValue, supporting both f32 and f16.
    ///
    /// The input shape is expected to be [batch_size, decoder_sequence_length,
    /// vocab_size]. The decoder emits one step at a time, so the length-1
    /// sequence axis is removed.
    pub fn from_3d_dyn_value(value: &DynValue) -> Result<Self> {
        let (shape, data): (Vec<usize>, Vec<f32>) =
            if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
                let shape_vec: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
                (shape_vec, data.to_vec())
            } else if let Ok((shape, data)) = value.try_extract_tensor::<f16>() {
                let shape_vec: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
                let data_f32: Vec<f32> = data.iter().map(|e| f32::from(*e)).collect();
                (shape_vec, data_f32)
            } else {
                return Err(EngineError::model_inference_failed(
                    "Logits must be f32 or f16",
                ));
            };

        let arr = Array::from_shape_vec(IxDyn(&shape), data).map_err(|e| {
            EngineError::model_inference_failed(format!("Failed to create array: {}", e))
        })?;

        let arr = arr.into_dimensionality::<Ix3>().map_err(|e| {
            EngineError::model_inference_failed(format!("Expected 3D logits: {}", e))
        })?;

        let arr = arr.remove_axis(Axis(1));
        Ok(Self(arr))
    }

    /// Applies classifier-free guidance to a batched pass.
    ///
    /// The batch holds conditional logits in the first half and unconditional
    /// logits in the second half; the blend applied is
    /// `guided = uncond + (cond - uncond) * cfg_coef`.
    pub fn apply_free_guidance(self, cfg_coef: f32) -> Result<Self> {
        if self.0.dim().0 % 2 != 0 {
            return Err(EngineError::model_inference_failed(
                "free guidance needs an even batch of conditional + unconditional logits",
            ));
        }

        let unguided_bsz = self.0.dim().0 / 2;
        let cond_logits = self.0.slice(s![0..unguided_bsz, ..]);
        let uncond_logits = self.0.slice(s![unguided_bsz.., ..]);

        Ok(Self(
            (cond_logits.into_owned() - uncond_logits) * cfg_coef + uncond_logits,
        ))
    }

    /// Blends separate conditional and unconditional passes (two-step CFG).
    pub fn guided(cond: Logits, uncond: Logits, cfg_coef: f32) -> Result<Self> {
        if cond.0.dim() != uncond.0.dim() {
            return Err(EngineError::model_inference_failed(format!(
                "two-step guidance shape mismatch: {:?} vs {:?}",
                cond.0.dim(),
                uncond.0.dim()
            )));
        }
        Ok(Self((cond.0 - &uncond.0) * cfg_coef + uncond.0))
    }

    /// Picks one token per batch row according to the sampling parameters.
    ///
    /// Argmax when sampling is disabled; otherwise nucleus sampling when
    /// `top_p` is nonzero, top-k sampling otherwise, both after temperature
    /// scaling.
    pub fn sample(&self, sampling: &SamplingParams, rng: &mut ChaCha8Rng) -> Result<Vec<i64>> {
        let scaled = if sampling.temperature != 1.0 {
            self.0.mapv(|x| x / sampling.temperature)
        } else {
            self.0.clone()
        };

        if !sampling.use_sampling {
            return Ok(argmax_rows(&scaled));
        }

        let probs = scaled.softmax(Axis(1));
        let mut result = Vec::with_capacity(probs.dim().0);

        for batch in probs.axis_iter(Axis(0)) {
            // Vec<(token_id, softmax_prob)>, most probable first.
            let mut candidates = batch
                .iter()
                .enumerate()
                .map(|(i, e)| (i as i64, *e))
                .collect::<Vec<_>>();
            candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

            if sampling.top_p > 0.0 {
                let mut cumulative = 0.0f32;
                let mut keep = 0;
                for (_, p) in &candidates {
                    keep += 1;
                    cumulative += p;
                    if cumulative >= sampling.top_p {
                        break;
                    }
                }
                candidates.truncate(keep.max(1));
            } else {
                let k = sampling.top_k.max(1).min(candidates.len());
                candidates.truncate(k);
            }

            let distribution =
                WeightedIndex::new(candidates.iter().map(|e| e.1)).map_err(|e| {
                    EngineError::model_inference_failed(format!(
                        "Could not build sampling distribution: {}",
                        e
                    ))
                })?;
            let (token_id, _) = candidates[distribution.sample(rng)];
            result.push(token_id);
        }

        Ok(result)
    }
}

/// Argmax per batch row.
fn argmax_rows(arr: &Array2<f32>) -> Vec<i64> {
    arr.axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i as i64)
                .unwrap_or(0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn params() -> SamplingParams {
        SamplingParams::default()
    }

    #[test]
    fn free_guidance_halves_batch() {
        let arr = Array::from_shape_vec((2, 3), vec![10., -1., 3., -1., 1., 11.]).unwrap();
        let logits = Logits::from_array(arr).apply_free_guidance(3.0).unwrap();
        assert_eq!(logits.shape(), &[1, 3]);
    }

    #[test]
    fn free_guidance_rejects_odd_batch() {
        let arr = Array::from_shape_vec((3, 2), vec![0.; 6]).unwrap();
        assert!(Logits::from_array(arr).apply_free_guidance(3.0).is_err());
    }

    #[test]
    fn two_step_guidance_matches_batched() {
        let cond = Array::from_shape_vec((1, 3), vec![10., -1., 3.]).unwrap();
        let uncond = Array::from_shape_vec((1, 3), vec![-1., 1., 11.]).unwrap();

        let batched = Array::from_shape_vec((2, 3), vec![10., -1., 3., -1., 1., 11.]).unwrap();
        let batched = Logits::from_array(batched).apply_free_guidance(3.0).unwrap();
        let two_step = Logits::guided(
            Logits::from_array(cond),
            Logits::from_array(uncond),
            3.0,
        )
        .unwrap();

        assert_eq!(batched.0, two_step.0);
    }

    #[test]
    fn sample_top_k_returns_valid_indices() {
        let arr = Array::from_shape_vec((2, 3), vec![0.1, 0.2, 0.7, 0.3, 0.4, 0.3]).unwrap();
        let logits = Logits::from_array(arr);
        let mut rng = sampling_rng(Some(7));
        let mut sampling = params();
        sampling.top_k = 2;
        let samples = logits.sample(&sampling, &mut rng).unwrap();
        assert_eq!(samples.len(), 2);
        for idx in &samples {
            assert!(*idx >= 0 && *idx < 3);
        }
    }

    #[test]
    fn argmax_is_deterministic() {
        let arr = Array::from_shape_vec((2, 4), vec![0., 9., 1., 2., 5., 1., 8., 0.]).unwrap();
        let logits = Logits::from_array(arr);
        let mut sampling = params();
        sampling.use_sampling = false;
        let mut rng = sampling_rng(None);
        assert_eq!(logits.sample(&sampling, &mut rng).unwrap(), vec![1, 2]);
    }

    #[test]
    fn top_p_keeps_the_nucleus() {
        // One token dominates; a tight nucleus must always pick it.
        let arr = Array::from_shape_vec((1, 3), vec![10.0, 0.0, 0.0]).unwrap();
        let logits = Logits::from_array(arr);
        let mut sampling = params();
        sampling.top_p = 0.5;
        let mut rng = sampling_rng(Some(3));
        for _ in 0..8 {
            assert_eq!(logits.sample(&sampling, &mut rng).unwrap(), vec![0]);
        }
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let arr = Array::from_shape_vec((1, 8), (0..8).map(|i| i as f32).collect()).unwrap();
        let logits = Logits::from_array(arr);
        let sampling = params();

        let mut a = sampling_rng(Some(42));
        let mut b = sampling_rng(Some(42));
        let first = logits.sample(&sampling, &mut a).unwrap();
        let second = logits.sample(&sampling, &mut b).unwrap();
        assert_eq!(first, second);
    }
}
