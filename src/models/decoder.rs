//! VidMuse decoder wrapper with KV cache support.
//!
//! Implements autoregressive token generation using the split decoder
//! architecture (`decoder_model.onnx` for the first pass,
//! `decoder_with_past_model.onnx` for cached steps). Conditioning hidden
//! states come from the video tower when video is present, from the T5 text
//! encoder otherwise. Continuation prompts are teacher-forced through the
//! delay pattern before new frames are sampled, so the returned sequence is
//! always `prompt + max_gen_len` frames.
//!
//! The exported graphs are batch-1; classifier-free guidance widens the row
//! dimension instead (2 conditioning rows x 4 codebooks in batched mode).

use std::borrow::Cow;
use std::collections::VecDeque;
use std::path::Path;

use half::f16;
use ndarray::{concatenate, Array3, Axis};
use num_traits::Zero;
use ort::session::{Session, SessionInputValue};
use ort::value::{DynValue, Tensor};
use rand_chacha::ChaCha8Rng;

use crate::conditioning::ConditioningSet;
use crate::error::{EngineError, Result};
use crate::types::{ModelConfig, SamplingParams, TokenSequence};

use super::delay_pattern::DelayPatternMaskIds;
use super::logits::{sampling_rng, Logits};
use super::text_encoder::TextEncoder;
use super::video_encoder::VideoEncoder;
use super::{StepCallback, TokenDecoder};

/// Number of EnCodec codebooks generated in parallel.
const CODEBOOKS: usize = 4;

/// VidMuse autoregressive decoder using split ONNX sessions with KV cache.
pub struct VidMuseDecoder {
    decoder_model: Session,
    decoder_with_past: Session,
    text_encoder: TextEncoder,
    video_encoder: VideoEncoder,
    config: ModelConfig,
    use_fp16: bool,
    wav_conditioner: bool,
}

/// One guidance stream: its conditioning tensors and KV cache.
struct CfgStream {
    encoder_hidden: DynValue,
    encoder_mask: DynValue,
    kv_cache: Vec<(String, DynValue)>,
}

impl VidMuseDecoder {
    /// Loads the decoder ensemble from a directory.
    ///
    /// Expects `decoder_model.onnx`, `decoder_with_past_model.onnx`,
    /// `text_encoder.onnx` + `tokenizer.json`, and `video_encoder.onnx`.
    pub fn load(
        model_dir: &Path,
        config: ModelConfig,
        use_fp16: bool,
        wav_conditioner: bool,
    ) -> Result<Self> {
        if config.codebooks as usize != CODEBOOKS {
            return Err(EngineError::model_load_failed(format!(
                "decoder supports {} codebooks, config declares {}",
                CODEBOOKS, config.codebooks
            )));
        }

        let decoder_model = load_session(&model_dir.join("decoder_model.onnx"))?;
        let decoder_with_past = load_session(&model_dir.join("decoder_with_past_model.onnx"))?;
        let text_encoder = TextEncoder::load(model_dir)?;
        let video_encoder = VideoEncoder::load(model_dir)?;

        Ok(Self {
            decoder_model,
            decoder_with_past,
            text_encoder,
            video_encoder,
            config,
            use_fp16,
            wav_conditioner,
        })
    }

    /// Assembles the conditioning hidden-state sequence for one sample.
    ///
    /// Video conditioning concatenates the local and global tower outputs
    /// along the sequence axis; without video, the text description (or the
    /// empty string) is encoded instead.
    fn encode_conditioning(&mut self, conditioning: &ConditioningSet) -> Result<Array3<f32>> {
        match &conditioning.video {
            Some(video) => {
                let (local_hidden, global_hidden) =
                    self.video_encoder.encode(&video.local, &video.global)?;
                concatenate(Axis(1), &[local_hidden.view(), global_hidden.view()]).map_err(|e| {
                    EngineError::model_inference_failed(format!(
                        "Failed to join local/global hidden states: {}",
                        e
                    ))
                })
            }
            None => {
                let description = conditioning.attributes[0].description.as_deref();
                self.text_encoder.encode(description)
            }
        }
    }

    /// Builds the melody input tensor when a real wav condition is present.
    fn melody_input(&self, conditioning: &ConditioningSet) -> Result<Option<DynValue>> {
        let wav = &conditioning.attributes[0].wav;
        if wav.is_placeholder() {
            return Ok(None);
        }
        if !self.wav_conditioner {
            return Err(EngineError::unsupported_conditioning(
                "this model was exported without a wav conditioner",
            ));
        }

        let dim = wav.samples.dim();
        let data: Vec<f32> = wav.samples.iter().copied().collect();
        let tensor =
            Tensor::from_array((vec![dim.0, dim.1, dim.2], data)).map_err(|e| {
                EngineError::model_inference_failed(format!(
                    "Failed to create melody tensor: {}",
                    e
                ))
            })?;
        Ok(Some(tensor.into_dyn()))
    }

    /// Runs the first (uncached) pass for one stream and captures its KV cache.
    fn first_pass(
        &mut self,
        stream: &mut CfgStream,
        input_ids: &DynValue,
        melody: Option<&DynValue>,
    ) -> Result<Logits> {
        let mut session_inputs: Vec<(Cow<'_, str>, SessionInputValue<'_>)> = vec![
            (Cow::from("input_ids"), SessionInputValue::from(input_ids.view())),
            (
                Cow::from("encoder_attention_mask"),
                SessionInputValue::from(stream.encoder_mask.view()),
            ),
            (
                Cow::from("encoder_hidden_states"),
                SessionInputValue::from(stream.encoder_hidden.view()),
            ),
        ];
        if let Some(melody) = melody {
            session_inputs.push((
                Cow::from("melody_input_values"),
                SessionInputValue::from(melody.view()),
            ));
        }

        let mut outputs = self.decoder_model.run(session_inputs).map_err(|e| {
            EngineError::model_inference_failed(format!("Initial decoder inference failed: {}", e))
        })?;

        let logits_value = outputs
            .remove("logits")
            .ok_or_else(|| EngineError::model_inference_failed("logits not found in output"))?;
        let logits = Logits::from_3d_dyn_value(&logits_value)?;

        // Capture the full KV cache: decoder entries are overwritten each
        // step, encoder entries stay fixed for the whole call.
        let num_hidden_layers = self.config.num_hidden_layers as usize;
        stream.kv_cache.clear();
        for j in 0..num_hidden_layers {
            for kind in ["decoder.key", "decoder.value", "encoder.key", "encoder.value"] {
                let name = format!("present.{j}.{kind}");
                let value = outputs.remove(&name).ok_or_else(|| {
                    EngineError::model_inference_failed(format!("{name} not found"))
                })?;
                stream
                    .kv_cache
                    .push((format!("past_key_values.{j}.{kind}"), value));
            }
        }

        Ok(logits)
    }

    /// Runs one cached step for one stream and refreshes its decoder KV entries.
    fn cached_step(&mut self, stream: &mut CfgStream, input_ids: &DynValue) -> Result<Logits> {
        let mut session_inputs: Vec<(Cow<'_, str>, SessionInputValue<'_>)> = vec![
            (Cow::from("input_ids"), SessionInputValue::from(input_ids.view())),
            (
                Cow::from("encoder_attention_mask"),
                SessionInputValue::from(stream.encoder_mask.view()),
            ),
        ];
        for (k, v) in &stream.kv_cache {
            session_inputs.push((Cow::from(k.as_str()), SessionInputValue::from(v.view())));
        }

        let mut outputs = self.decoder_with_past.run(session_inputs).map_err(|e| {
            EngineError::model_inference_failed(format!("Decoder with past inference failed: {}", e))
        })?;

        let logits_value = outputs
            .remove("logits")
            .ok_or_else(|| EngineError::model_inference_failed("logits not found"))?;
        let logits = Logits::from_3d_dyn_value(&logits_value)?;

        let num_layers = stream.kv_cache.len() / 4;
        for j in 0..num_layers {
            for (offset, kind) in ["decoder.key", "decoder.value"].iter().enumerate() {
                let name = format!("present.{j}.{kind}");
                let value = outputs.remove(&name).ok_or_else(|| {
                    EngineError::model_inference_failed(format!("{name} not found"))
                })?;
                stream.kv_cache[j * 4 + offset] = (format!("past_key_values.{j}.{kind}"), value);
            }
        }

        Ok(logits)
    }

    /// Combines per-stream logits into the guided `[CODEBOOKS, vocab]` array.
    fn guided_logits(
        &mut self,
        streams: &mut [CfgStream],
        input_ids: &DynValue,
        sampling: &SamplingParams,
        first: bool,
        melody: Option<&DynValue>,
    ) -> Result<Logits> {
        if streams.len() == 2 {
            // Two-step CFG: conditional and unconditional forward passes.
            let (cond_stream, uncond_stream) = {
                let (a, b) = streams.split_at_mut(1);
                (&mut a[0], &mut b[0])
            };
            let cond = if first {
                self.first_pass(cond_stream, input_ids, melody)?
            } else {
                self.cached_step(cond_stream, input_ids)?
            };
            let uncond = if first {
                self.first_pass(uncond_stream, input_ids, None)?
            } else {
                self.cached_step(uncond_stream, input_ids)?
            };
            Logits::guided(cond, uncond, sampling.cfg_coef)
        } else {
            let stream = &mut streams[0];
            let logits = if first {
                self.first_pass(stream, input_ids, melody)?
            } else {
                self.cached_step(stream, input_ids)?
            };
            logits.apply_free_guidance(sampling.cfg_coef)
        }
    }

    /// Builds one decoder input step from the delayed token view.
    fn step_input_ids(&self, frame: [i64; CODEBOOKS], cfg_rows: usize) -> Result<DynValue> {
        let rows = cfg_rows * CODEBOOKS;
        let mut data = Vec::with_capacity(rows);
        for _ in 0..cfg_rows {
            data.extend_from_slice(&frame);
        }
        let tensor = Tensor::from_array(([rows, 1usize], data)).map_err(|e| {
            EngineError::model_inference_failed(format!("Failed to create input_ids: {}", e))
        })?;
        Ok(tensor.into_dyn())
    }

    /// Prepares the guidance streams for one generation call.
    fn build_streams(
        &mut self,
        conditioning: &ConditioningSet,
        sampling: &SamplingParams,
    ) -> Result<Vec<CfgStream>> {
        let hidden = self.encode_conditioning(conditioning)?;
        let seq_len = hidden.dim().1;

        if sampling.two_step_cfg {
            let zeros = Array3::<f32>::zeros(hidden.dim());
            Ok(vec![
                CfgStream {
                    encoder_hidden: hidden_tensor(&hidden, self.use_fp16, false)?,
                    encoder_mask: mask_tensor(1, seq_len)?,
                    kv_cache: Vec::new(),
                },
                CfgStream {
                    encoder_hidden: hidden_tensor(&zeros, self.use_fp16, false)?,
                    encoder_mask: mask_tensor(1, seq_len)?,
                    kv_cache: Vec::new(),
                },
            ])
        } else {
            // Batched CFG: conditional row first, zeroed unconditional row after.
            Ok(vec![CfgStream {
                encoder_hidden: hidden_tensor(&hidden, self.use_fp16, true)?,
                encoder_mask: mask_tensor(2, seq_len)?,
                kv_cache: Vec::new(),
            }])
        }
    }
}

impl TokenDecoder for VidMuseDecoder {
    fn generate(
        &mut self,
        prompt: Option<&TokenSequence>,
        conditioning: &ConditioningSet,
        max_gen_len: usize,
        sampling: &SamplingParams,
        mut callback: Option<StepCallback<'_>>,
    ) -> Result<TokenSequence> {
        if conditioning.attributes.len() != 1 {
            return Err(EngineError::shape_mismatch(format!(
                "the exported decoder graphs are batch-1, got {} conditioning records",
                conditioning.attributes.len()
            )));
        }

        let prompt_frames: Vec<[i64; CODEBOOKS]> = match prompt {
            Some(prompt) => {
                if prompt.batch() != 1 || prompt.codebooks() != CODEBOOKS {
                    return Err(EngineError::shape_mismatch(format!(
                        "prompt must be [1, {}, T], got [{}, {}, T]",
                        CODEBOOKS,
                        prompt.batch(),
                        prompt.codebooks()
                    )));
                }
                prompt
                    .codebook_frames()
                    .iter()
                    .map(|f| [f[0], f[1], f[2], f[3]])
                    .collect()
            }
            None => Vec::new(),
        };
        let prompt_len = prompt_frames.len();

        let melody = self.melody_input(conditioning)?;
        let mut streams = self.build_streams(conditioning, sampling)?;
        let cfg_rows = if sampling.two_step_cfg { 1 } else { 2 };

        let pad_token_id = self.config.pad_token_id;
        let mut rng: ChaCha8Rng = sampling_rng(sampling.seed);
        let mut ids = DelayPatternMaskIds::<CODEBOOKS>::new();
        let mut results: VecDeque<[i64; CODEBOOKS]> = VecDeque::new();

        // The delay pattern trails by CODEBOOKS-1 steps, so that many extra
        // steps flush the last diagonals out.
        let total_steps = prompt_len + max_gen_len + (CODEBOOKS - 1);

        for step in 0..total_steps {
            let delayed = ids.last_delayed_masked(pad_token_id);
            let input_ids = self.step_input_ids(delayed, cfg_rows)?;

            let logits =
                self.guided_logits(&mut streams, &input_ids, sampling, step == 0, melody.as_ref())?;

            let frame: [i64; CODEBOOKS] = if step < prompt_len {
                // Teacher-force the continuation prompt through the same
                // delay state; the sampled logits are discarded.
                prompt_frames[step]
            } else {
                let sampled = logits.sample(sampling, &mut rng)?;
                if sampled.len() != CODEBOOKS {
                    return Err(EngineError::model_inference_failed(format!(
                        "expected {} codebook logits rows, got {}",
                        CODEBOOKS,
                        sampled.len()
                    )));
                }
                [sampled[0], sampled[1], sampled[2], sampled[3]]
            };

            ids.push(frame);
            if let Some(frame) = ids.last_de_delayed() {
                results.push_back(frame);
            }

            if step >= prompt_len {
                let done = (step - prompt_len + 1).min(max_gen_len);
                if let Some(cb) = callback.as_mut() {
                    cb(done, max_gen_len);
                }
            }
        }

        let frames: Vec<[i64; CODEBOOKS]> = results.into_iter().collect();
        if frames.len() != prompt_len + max_gen_len {
            return Err(EngineError::model_inference_failed(format!(
                "decoder produced {} frames, expected {}",
                frames.len(),
                prompt_len + max_gen_len
            )));
        }

        Ok(TokenSequence::from_codebook_frames(&frames))
    }

    fn video_embedding(&mut self, conditioning: &ConditioningSet) -> Result<Array3<f32>> {
        match &conditioning.video {
            Some(video) => {
                let (local_hidden, _global_hidden) =
                    self.video_encoder.encode(&video.local, &video.global)?;
                Ok(local_hidden)
            }
            None => Err(EngineError::shape_mismatch(
                "video embedding requires video conditioning",
            )),
        }
    }

    fn supports_wav_conditioning(&self) -> bool {
        self.wav_conditioner
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

/// Builds an encoder hidden-state tensor in the precision the graph expects.
///
/// With `duplicate_with_zeros` the batch axis is doubled and the second half
/// filled with zeros, which is the unconditional half of a batched
/// classifier-free-guidance pass.
fn hidden_tensor(hidden: &Array3<f32>, use_fp16: bool, duplicate_with_zeros: bool) -> Result<DynValue> {
    let dim = hidden.dim();
    let shape = vec![dim.0, dim.1, dim.2];
    if use_fp16 {
        let data: Vec<f16> = hidden.iter().map(|v| f16::from_f32(*v)).collect();
        typed_hidden_tensor(shape, data, duplicate_with_zeros)
    } else {
        let data: Vec<f32> = hidden.iter().copied().collect();
        typed_hidden_tensor(shape, data, duplicate_with_zeros)
    }
}

fn typed_hidden_tensor<T>(
    mut shape: Vec<usize>,
    mut data: Vec<T>,
    duplicate_with_zeros: bool,
) -> Result<DynValue>
where
    T: ort::tensor::PrimitiveTensorElementType + Clone + Zero + std::fmt::Debug + 'static,
{
    if duplicate_with_zeros {
        let len = data.len();
        shape[0] *= 2;
        data.extend(std::iter::repeat(T::zero()).take(len));
    }
    let tensor = Tensor::from_array((shape, data)).map_err(|e| {
        EngineError::model_inference_failed(format!("Failed to create tensor: {}", e))
    })?;
    Ok(tensor.into_dyn())
}

/// All-ones attention mask, `[rows, seq_len]`.
fn mask_tensor(rows: usize, seq_len: usize) -> Result<DynValue> {
    let tensor =
        Tensor::from_array((vec![rows, seq_len], vec![1i64; rows * seq_len])).map_err(|e| {
            EngineError::model_inference_failed(format!("Failed to create attention mask: {}", e))
        })?;
    Ok(tensor.into_dyn())
}
