//! User-facing generation session.
//!
//! A [`GenerationSession`] owns the decoder and codec, holds the current
//! generation parameters (validated when set, read-only during calls), and
//! exposes the generation surfaces: unconditional, text-conditioned,
//! video-conditioned, melody-conditioned, audio continuation, and video
//! embedding extraction. Every path assembles conditioning through the
//! attribute builder and then routes through the windowed controller.
//!
//! Sessions are single-threaded: one generation call runs at a time, state
//! local to a call never leaks across calls, and callers wanting parallelism
//! use independent sessions.

use ndarray::{Array3, ArrayD};

use crate::conditioning::{
    ConditioningAttributeBuilder, ConditioningAttributes, ConditioningSet, VideoConditioning,
};
use crate::error::{EngineError, Result};
use crate::models::{AudioCodec, EncodecCodec, TokenDecoder, VidMuseDecoder, VidMuseModels};
use crate::types::{GenerationParams, ModelConfig, TokenSequence};

use super::window::WindowedGenerationController;
use super::{NoopProgress, ProgressObserver};

/// Facade over the decoder, codec, and generation parameters.
pub struct GenerationSession<D: TokenDecoder, C: AudioCodec> {
    decoder: D,
    codec: C,
    config: ModelConfig,
    params: GenerationParams,
    observer: Box<dyn ProgressObserver>,
}

impl GenerationSession<VidMuseDecoder, EncodecCodec> {
    /// Builds a session from a loaded model ensemble.
    pub fn from_models(models: VidMuseModels) -> Result<Self> {
        Self::new(models.decoder, models.codec, models.config)
    }
}

impl<D: TokenDecoder, C: AudioCodec> GenerationSession<D, C> {
    /// Creates a session with default generation parameters.
    pub fn new(decoder: D, codec: C, config: ModelConfig) -> Result<Self> {
        if let Some(problem) = config.validate() {
            return Err(EngineError::invalid_configuration(problem));
        }
        let params = GenerationParams::default();
        params.validate(config.max_duration_sec)?;
        Ok(Self {
            decoder,
            codec,
            config,
            params,
            observer: Box::new(NoopProgress),
        })
    }

    /// Replaces the generation parameters.
    ///
    /// Validation happens here, at set time, so a bad stride surfaces as a
    /// configuration error before any generation is attempted.
    pub fn set_generation_params(&mut self, params: GenerationParams) -> Result<()> {
        params.validate(self.config.max_duration_sec)?;
        self.params = params;
        Ok(())
    }

    /// Installs a progress observer used when `progress` is requested.
    pub fn set_progress_observer(&mut self, observer: Box<dyn ProgressObserver>) {
        self.observer = observer;
    }

    /// Current generation parameters.
    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// Model configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Sample rate of the generated audio.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Audio channels of the generated audio.
    pub fn audio_channels(&self) -> u32 {
        self.config.audio_channels
    }

    /// Token frames emitted per second of audio.
    pub fn frame_rate(&self) -> u32 {
        self.config.frame_rate
    }

    /// Generates tokens conditioned on video (and optional descriptions).
    ///
    /// `descriptions` must hold one entry per batch sample in the video
    /// conditioning.
    pub fn generate(
        &mut self,
        video: VideoConditioning,
        descriptions: &[Option<String>],
        progress: bool,
    ) -> Result<TokenSequence> {
        if descriptions.len() != video.local.batch() {
            return Err(EngineError::shape_mismatch(format!(
                "got {} descriptions for a video batch of {}",
                descriptions.len(),
                video.local.batch()
            )));
        }

        let mut builder = ConditioningAttributeBuilder::new(&mut self.codec, &self.config);
        let (attributes, _) = builder.prepare(descriptions, None, None)?;
        let conditioning = ConditioningSet::with_video(attributes, video);
        self.run_controller(&conditioning, None, progress)
    }

    /// Generates samples unconditionally.
    pub fn generate_unconditional(
        &mut self,
        num_samples: usize,
        progress: bool,
    ) -> Result<TokenSequence> {
        let descriptions: Vec<Option<String>> = vec![None; num_samples];
        self.generate_with_descriptions(&descriptions, progress)
    }

    /// Generates tokens conditioned on text descriptions only.
    pub fn generate_with_descriptions(
        &mut self,
        descriptions: &[Option<String>],
        progress: bool,
    ) -> Result<TokenSequence> {
        if descriptions.is_empty() {
            return Err(EngineError::shape_mismatch(
                "at least one description (or None placeholder) is required",
            ));
        }
        let mut builder = ConditioningAttributeBuilder::new(&mut self.codec, &self.config);
        let (attributes, _) = builder.prepare(descriptions, None, None)?;
        let conditioning = ConditioningSet::from_attributes(attributes);
        self.run_controller(&conditioning, None, progress)
    }

    /// Generates tokens conditioned on text and melody waveforms.
    ///
    /// Each melody entry is `[1, channels, time]` at `melody_sample_rate`;
    /// `None` entries fall back to the placeholder condition.
    pub fn generate_with_melody(
        &mut self,
        descriptions: &[Option<String>],
        melody_wavs: &[Option<Array3<f32>>],
        melody_sample_rate: u32,
        progress: bool,
    ) -> Result<TokenSequence> {
        if !self.decoder.supports_wav_conditioning() {
            return Err(EngineError::unsupported_conditioning(
                "this model does not support melody conditioning",
            ));
        }
        for wav in melody_wavs.iter().flatten() {
            if wav.dim().0 != 1 {
                return Err(EngineError::shape_mismatch(format!(
                    "each melody wav must be [1, C, T], got batch {}",
                    wav.dim().0
                )));
            }
        }

        let mut builder = ConditioningAttributeBuilder::new(&mut self.codec, &self.config);
        let (attributes, _) =
            builder.prepare(descriptions, None, Some((melody_wavs, melody_sample_rate)))?;
        let conditioning = ConditioningSet::from_attributes(attributes);
        self.run_controller(&conditioning, None, progress)
    }

    /// Generates a continuation of an audio prompt.
    ///
    /// The prompt is `[C, T]`, or `[B, C, T]` for a batch; it is resampled to
    /// the model's format, encoded through the codec, and the generated
    /// sequence starts with it. When `descriptions` is None the continuation
    /// is text-unconditional.
    pub fn generate_continuation(
        &mut self,
        prompt: &ArrayD<f32>,
        prompt_sample_rate: u32,
        descriptions: Option<&[Option<String>]>,
        progress: bool,
    ) -> Result<TokenSequence> {
        let prompt = promote_prompt(prompt)?;

        let owned_descriptions: Vec<Option<String>> = match descriptions {
            Some(descriptions) => descriptions.to_vec(),
            None => vec![None; prompt.dim().0],
        };

        let mut builder = ConditioningAttributeBuilder::new(&mut self.codec, &self.config);
        let (attributes, prompt_tokens) = builder.prepare(
            &owned_descriptions,
            Some((&prompt, prompt_sample_rate)),
            None,
        )?;
        let conditioning = ConditioningSet::from_attributes(attributes);
        self.run_controller(&conditioning, prompt_tokens, progress)
    }

    /// Returns the video conditioning hidden states without generating audio.
    pub fn generate_video_embedding(&mut self, video: VideoConditioning) -> Result<Array3<f32>> {
        let attributes = vec![ConditioningAttributes::new(None, self.config.sample_rate)];
        let conditioning = ConditioningSet::with_video(attributes, video);
        self.decoder.video_embedding(&conditioning)
    }

    /// Decodes a generated token sequence into audio.
    pub fn generate_audio(&mut self, tokens: &TokenSequence) -> Result<Array3<f32>> {
        self.codec.decode(tokens, None)
    }

    /// Routes one request through the windowed controller.
    fn run_controller(
        &mut self,
        conditioning: &ConditioningSet,
        prompt: Option<TokenSequence>,
        progress: bool,
    ) -> Result<TokenSequence> {
        let mut noop = NoopProgress;
        let observer: &mut dyn ProgressObserver = if progress {
            self.observer.as_mut()
        } else {
            &mut noop
        };

        let mut controller = WindowedGenerationController::new(&mut self.decoder, &self.config);
        controller.generate(conditioning, prompt, &self.params, observer)
    }
}

/// Promotes a 2-D `[C, T]` prompt to `[1, C, T]`; rejects any other rank.
fn promote_prompt(prompt: &ArrayD<f32>) -> Result<Array3<f32>> {
    match prompt.ndim() {
        2 => {
            let dim = (1, prompt.shape()[0], prompt.shape()[1]);
            let data: Vec<f32> = prompt.iter().copied().collect();
            Array3::from_shape_vec(dim, data)
                .map_err(|e| EngineError::shape_mismatch(format!("prompt layout: {}", e)))
        }
        3 => prompt
            .to_owned()
            .into_dimensionality::<ndarray::Ix3>()
            .map_err(|e| EngineError::shape_mismatch(format!("prompt layout: {}", e))),
        n => Err(EngineError::shape_mismatch(format!(
            "prompt should have 2 or 3 dimensions ([C, T] or [B, C, T]), got {}",
            n
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditioning::VideoFeatures;
    use crate::error::ErrorCode;
    use crate::models::StepCallback;
    use crate::types::SamplingParams;
    use ndarray::{Array3, Array5, IxDyn};

    /// Decoder stub that records call shapes and honors the length contract.
    struct StubDecoder {
        calls: usize,
        melody_capable: bool,
    }

    impl StubDecoder {
        fn new(melody_capable: bool) -> Self {
            Self {
                calls: 0,
                melody_capable,
            }
        }
    }

    impl TokenDecoder for StubDecoder {
        fn generate(
            &mut self,
            prompt: Option<&TokenSequence>,
            _conditioning: &ConditioningSet,
            max_gen_len: usize,
            _sampling: &SamplingParams,
            _callback: Option<StepCallback<'_>>,
        ) -> Result<TokenSequence> {
            self.calls += 1;
            let prompt_len = prompt.map_or(0, |p| p.time_len());
            Ok(TokenSequence::new(Array3::zeros((
                1,
                4,
                prompt_len + max_gen_len,
            ))))
        }

        fn video_embedding(&mut self, _conditioning: &ConditioningSet) -> Result<Array3<f32>> {
            Ok(Array3::zeros((1, 16, 8)))
        }

        fn supports_wav_conditioning(&self) -> bool {
            self.melody_capable
        }
    }

    /// Scale-free codec stub at 640 samples per token.
    struct StubCodec;

    impl AudioCodec for StubCodec {
        fn encode(&mut self, waveform: &Array3<f32>) -> Result<(TokenSequence, Option<f32>)> {
            let frames = waveform.dim().2 / 640;
            Ok((
                TokenSequence::new(Array3::zeros((waveform.dim().0, 4, frames))),
                None,
            ))
        }

        fn decode(&mut self, tokens: &TokenSequence, _scale: Option<f32>) -> Result<Array3<f32>> {
            Ok(Array3::zeros((
                tokens.batch(),
                1,
                tokens.time_len() * 640,
            )))
        }
    }

    fn session(melody_capable: bool) -> GenerationSession<StubDecoder, StubCodec> {
        GenerationSession::new(
            StubDecoder::new(melody_capable),
            StubCodec,
            ModelConfig::vidmuse_small(),
        )
        .unwrap()
    }

    fn video(frames: usize) -> VideoConditioning {
        VideoConditioning {
            local: VideoFeatures::new(Array5::zeros((1, 2, frames, 2, 2))),
            global: VideoFeatures::new(Array5::zeros((1, 2, 4, 2, 2))),
        }
    }

    #[test]
    fn invalid_stride_is_rejected_at_set_time() {
        // The configuration guard fires before any generation.
        let mut session = session(false);
        let mut params = GenerationParams::default();
        params.extend_stride = 30.0;
        let err = session.set_generation_params(params).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfiguration);
        assert_eq!(session.decoder.calls, 0);
    }

    #[test]
    fn unconditional_generation_produces_requested_length() {
        let mut session = session(false);
        session
            .set_generation_params(GenerationParams::with_duration(10.0))
            .unwrap();
        let tokens = session.generate_unconditional(1, false).unwrap();
        assert_eq!(tokens.time_len(), 500);
        assert_eq!(session.decoder.calls, 1);
    }

    #[test]
    fn video_generation_checks_description_count() {
        let mut session = session(false);
        let err = session
            .generate(video(60), &[None, None], false)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ShapeMismatch);
        assert_eq!(session.decoder.calls, 0);
    }

    #[test]
    fn melody_requires_a_wav_conditioner() {
        let mut session = session(false);
        let melodies = vec![Some(Array3::<f32>::zeros((1, 1, 32000)))];
        let err = session
            .generate_with_melody(&[None], &melodies, 44100, false)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedConditioning);
        assert_eq!(session.decoder.calls, 0);
    }

    #[test]
    fn melody_count_mismatch_makes_no_decoder_call() {
        // 3 melody tensors against 2 descriptions.
        let mut session = session(true);
        let melodies = vec![
            Some(Array3::<f32>::zeros((1, 1, 32000))),
            Some(Array3::<f32>::zeros((1, 1, 32000))),
            None,
        ];
        let err = session
            .generate_with_melody(&[None, None], &melodies, 32000, false)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ShapeMismatch);
        assert_eq!(session.decoder.calls, 0);
    }

    #[test]
    fn continuation_accepts_2d_and_3d_prompts() {
        let mut session = session(false);
        session
            .set_generation_params(GenerationParams::with_duration(10.0))
            .unwrap();

        // 2 seconds of audio -> 100 prompt tokens.
        let prompt_2d = ArrayD::<f32>::zeros(IxDyn(&[1, 64000]));
        let tokens = session
            .generate_continuation(&prompt_2d, 32000, None, false)
            .unwrap();
        assert_eq!(tokens.time_len(), 500);

        let prompt_3d = ArrayD::<f32>::zeros(IxDyn(&[1, 1, 64000]));
        let tokens = session
            .generate_continuation(&prompt_3d, 32000, None, false)
            .unwrap();
        assert_eq!(tokens.time_len(), 500);
    }

    #[test]
    fn continuation_rejects_other_ranks() {
        let mut session = session(false);
        let prompt = ArrayD::<f32>::zeros(IxDyn(&[1, 1, 1, 64000]));
        let err = session
            .generate_continuation(&prompt, 32000, None, false)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ShapeMismatch);
        assert_eq!(session.decoder.calls, 0);
    }

    #[test]
    fn generate_audio_decodes_tokens() {
        let mut session = session(false);
        let tokens = TokenSequence::new(Array3::zeros((1, 4, 500)));
        let audio = session.generate_audio(&tokens).unwrap();
        assert_eq!(audio.dim(), (1, 1, 500 * 640));
    }

    #[test]
    fn video_embedding_skips_generation() {
        let mut session = session(false);
        let embedding = session.generate_video_embedding(video(60)).unwrap();
        assert_eq!(embedding.dim(), (1, 16, 8));
        assert_eq!(session.decoder.calls, 0);
    }
}
