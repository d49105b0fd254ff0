//! Conditioning attribute assembly.
//!
//! Turns raw request inputs (descriptions, an optional continuation prompt,
//! optional melody waveforms) into the per-sample attribute records and the
//! encoded prompt tokens the decoder consumes. All shape validation happens
//! here, before any decoder call is made.

use ndarray::Array3;

use crate::audio::convert_audio;
use crate::error::{EngineError, Result};
use crate::models::AudioCodec;
use crate::types::{ModelConfig, TokenSequence};

use super::attributes::{ConditioningAttributes, WavCondition};

/// Builds [`ConditioningAttributes`] records and encodes continuation prompts.
pub struct ConditioningAttributeBuilder<'a, C: AudioCodec> {
    codec: &'a mut C,
    config: &'a ModelConfig,
}

impl<'a, C: AudioCodec> ConditioningAttributeBuilder<'a, C> {
    /// Creates a builder over the session's codec and model configuration.
    pub fn new(codec: &'a mut C, config: &'a ModelConfig) -> Self {
        Self { codec, config }
    }

    /// Prepares attribute records and optional prompt tokens.
    ///
    /// One record is produced per description. When no melody is given every
    /// record's wav slot holds the zero-length placeholder at the model's
    /// sample rate. A prompt waveform is resampled to the model's
    /// sample/channel format and encoded through the codec; the codec must be
    /// scale-free for this use.
    pub fn prepare(
        &mut self,
        descriptions: &[Option<String>],
        prompt: Option<(&Array3<f32>, u32)>,
        melody: Option<(&[Option<Array3<f32>>], u32)>,
    ) -> Result<(Vec<ConditioningAttributes>, Option<TokenSequence>)> {
        let mut attributes: Vec<ConditioningAttributes> = descriptions
            .iter()
            .map(|d| ConditioningAttributes::new(d.clone(), self.config.sample_rate))
            .collect();

        if let Some((melody_wavs, melody_sample_rate)) = melody {
            if melody_wavs.len() != descriptions.len() {
                return Err(EngineError::shape_mismatch(format!(
                    "number of melody wavs must match number of descriptions, \
                     got melody len={} and descriptions len={}",
                    melody_wavs.len(),
                    descriptions.len()
                )));
            }

            for (attr, melody_wav) in attributes.iter_mut().zip(melody_wavs) {
                if let Some(wav) = melody_wav {
                    let converted = convert_audio(
                        wav,
                        melody_sample_rate,
                        self.config.sample_rate,
                        self.config.audio_channels as usize,
                    )?;
                    attr.wav = WavCondition::from_melody(converted, self.config.sample_rate);
                }
            }
        }

        let prompt_tokens = match prompt {
            Some((waveform, prompt_sample_rate)) => {
                Some(self.encode_prompt(waveform, prompt_sample_rate, descriptions.len())?)
            }
            None => None,
        };

        Ok((attributes, prompt_tokens))
    }

    /// Resamples a `[B, C, T]` prompt to the model format and encodes it.
    fn encode_prompt(
        &mut self,
        waveform: &Array3<f32>,
        prompt_sample_rate: u32,
        expected_batch: usize,
    ) -> Result<TokenSequence> {
        if waveform.dim().0 != expected_batch {
            return Err(EngineError::shape_mismatch(format!(
                "prompt batch {} does not match description count {}",
                waveform.dim().0,
                expected_batch
            )));
        }

        let converted = convert_audio(
            waveform,
            prompt_sample_rate,
            self.config.sample_rate,
            self.config.audio_channels as usize,
        )?;

        let (tokens, scale) = self.codec.encode(&converted)?;
        if scale.is_some() {
            return Err(EngineError::unsupported_conditioning(
                "audio codec returned a scale factor; continuation requires a scale-free codec",
            ));
        }

        Ok(tokens)
    }
}
