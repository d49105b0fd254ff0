//! Windowed generation controller.
//!
//! The decoder has a fixed maximum context (`max_duration_sec`), shorter than
//! the durations callers ask for. This controller stitches a long sequence
//! out of bounded decoder calls: each chunk re-seeds the decoder with the
//! tail of the previous chunk as a continuation prompt, commits only the
//! newly generated suffix, and advances the local video conditioning window
//! so the video timeline keeps pace with the audio token timeline.
//!
//! Per chunk the controller advances by `extend_stride` seconds; the
//! remainder of the context (`max_duration - extend_stride`) is the overlap
//! carried forward as the continuity anchor. Work is therefore
//! O(duration / stride) decoder calls.

use crate::conditioning::{ConditioningSet, VideoFeatures};
use crate::error::{EngineError, Result};
use crate::models::TokenDecoder;
use crate::types::{GenerationParams, ModelConfig, TokenSequence};

use super::ProgressObserver;

/// Ephemeral state for one extended generation call.
///
/// Created when the loop starts, mutated only by the loop, discarded on
/// return. Nothing here survives across calls.
#[derive(Debug)]
pub struct GenerationState {
    /// Tokens already committed and strided past, in token frames.
    pub current_gen_offset: usize,
    /// Tail of the most recent chunk, used as the next continuation seed.
    pub prompt_tokens: Option<TokenSequence>,
    /// Remaining local video window, trimmed as generation advances.
    pub video_window: Option<VideoFeatures>,
    /// Accumulated output chunks, concatenated on completion.
    pub chunks: Vec<TokenSequence>,
    /// Total token frames committed to the output so far.
    pub committed: usize,
}

impl GenerationState {
    fn new(prompt: Option<TokenSequence>, video_window: Option<VideoFeatures>) -> Self {
        let mut chunks = Vec::new();
        let mut committed = 0;
        if let Some(prompt) = &prompt {
            // The prompt is part of the requested output: seed the chunk
            // list with it so the stitched sequence starts with it.
            chunks.push(prompt.clone());
            committed = prompt.time_len();
        }
        Self {
            current_gen_offset: 0,
            prompt_tokens: prompt,
            video_window,
            chunks,
            committed,
        }
    }

    fn prompt_len(&self) -> usize {
        self.prompt_tokens.as_ref().map_or(0, |p| p.time_len())
    }
}

/// Drives single-shot or multi-chunk generation against a [`TokenDecoder`].
pub struct WindowedGenerationController<'a, D: TokenDecoder> {
    decoder: &'a mut D,
    config: &'a ModelConfig,
}

impl<'a, D: TokenDecoder> WindowedGenerationController<'a, D> {
    /// Creates a controller over a decoder and its model configuration.
    pub fn new(decoder: &'a mut D, config: &'a ModelConfig) -> Self {
        Self { decoder, config }
    }

    /// Generates `params.duration` seconds of tokens.
    ///
    /// Takes the single-shot path when the duration fits the decoder's
    /// context, the extension loop otherwise. Fails fast, before any decoder
    /// call, on an invalid stride or an oversized continuation prompt; errors
    /// from the decoder propagate unchanged with no partial result.
    pub fn generate(
        &mut self,
        conditioning: &ConditioningSet,
        prompt: Option<TokenSequence>,
        params: &GenerationParams,
        observer: &mut dyn ProgressObserver,
    ) -> Result<TokenSequence> {
        params.validate(self.config.max_duration_sec)?;

        let total_gen_len = self.config.total_tokens(params.duration);
        let max_prompt_len = self.config.max_prompt_tokens(params.duration);
        if let Some(prompt) = &prompt {
            if prompt.time_len() > max_prompt_len {
                return Err(EngineError::prompt_too_long(prompt.time_len(), max_prompt_len));
            }
        }

        if params.duration <= self.config.max_duration_sec as f64 {
            self.generate_single(conditioning, prompt, params, total_gen_len, observer)
        } else {
            self.generate_extended(conditioning, prompt, params, total_gen_len, observer)
        }
    }

    /// One decoder call covering the whole request.
    fn generate_single(
        &mut self,
        conditioning: &ConditioningSet,
        prompt: Option<TokenSequence>,
        params: &GenerationParams,
        total_gen_len: usize,
        observer: &mut dyn ProgressObserver,
    ) -> Result<TokenSequence> {
        let prompt_len = prompt.as_ref().map_or(0, |p| p.time_len());
        // The prompt counts toward the requested duration, so only the
        // difference is newly generated.
        let max_gen_len = total_gen_len - prompt_len;

        let mut callback = |done: usize, _chunk_total: usize| {
            observer.on_progress(done.min(total_gen_len), total_gen_len);
        };

        self.decoder.generate(
            prompt.as_ref(),
            conditioning,
            max_gen_len,
            &params.sampling,
            Some(&mut callback),
        )
    }

    /// The extension loop for durations beyond the decoder context.
    fn generate_extended(
        &mut self,
        conditioning: &ConditioningSet,
        prompt: Option<TokenSequence>,
        params: &GenerationParams,
        total_gen_len: usize,
        observer: &mut dyn ProgressObserver,
    ) -> Result<TokenSequence> {
        let frame_rate = self.config.frame_rate as f64;
        let fps = self.config.video_fps as f64;
        let max_duration = self.config.max_duration_sec as f64;

        let stride_tokens = (frame_rate * params.extend_stride).round() as usize;
        let stride_video_frames = (fps * params.extend_stride).round() as usize;
        let max_window_frames = self.config.max_video_window();

        let mut state = GenerationState::new(
            prompt,
            conditioning.video.as_ref().map(|v| v.local.clone()),
        );

        // Frames consumed from the front of the local window, for the
        // audio/video alignment check below.
        let mut frames_consumed: usize = 0;
        let mut alignment_warned = false;

        while state.current_gen_offset + state.prompt_len() < total_gen_len {
            let time_offset = state.current_gen_offset as f64 / frame_rate;
            let chunk_duration = (params.duration - time_offset).min(max_duration);
            let chunk_tokens = (chunk_duration * frame_rate).round() as usize;
            // Clamp the request so the stitched output never overshoots the
            // asked-for duration on the final chunk.
            let max_gen_len = chunk_tokens.min(total_gen_len - state.committed);

            let windowed = match &state.video_window {
                Some(local) => {
                    let window_frames = (chunk_duration * fps).round() as usize;
                    conditioning.with_local_window(local.first_frames(window_frames))
                }
                None => conditioning.clone(),
            };

            let offset = state.current_gen_offset;
            let mut callback = |done: usize, _chunk_total: usize| {
                observer.on_progress((offset + done).min(total_gen_len), total_gen_len);
            };

            let gen_tokens = self.decoder.generate(
                state.prompt_tokens.as_ref(),
                &windowed,
                max_gen_len,
                &params.sampling,
                Some(&mut callback),
            )?;

            let prompt_len = state.prompt_len();
            let expected_len = prompt_len + max_gen_len;
            if gen_tokens.time_len() != expected_len {
                return Err(EngineError::model_inference_failed(format!(
                    "decoder returned {} frames, continuation contract expects {}",
                    gen_tokens.time_len(),
                    expected_len
                )));
            }

            // Commit only the newly generated suffix; the prompt prefix is
            // already part of the previous chunk (or the seeded prompt).
            let new_suffix = if prompt_len == 0 {
                gen_tokens.clone()
            } else {
                gen_tokens.suffix(prompt_len)
            };
            state.committed += new_suffix.time_len();
            state.chunks.push(new_suffix);

            // Re-seed: advance by the stride, keep the rest as context.
            let next_prompt = gen_tokens.suffix(stride_tokens);
            state.prompt_tokens = if next_prompt.is_empty() {
                None
            } else {
                Some(next_prompt)
            };

            // Advance the local video window in lockstep. Near the end of
            // the sequence, stride-dropping would leave the window short of
            // a full decoder context, so reset it to the fixed-size tail
            // instead of shrinking it further.
            if let Some(local) = state.video_window.take() {
                let frames = local.frames();
                let next = if frames.saturating_sub(stride_video_frames) < max_window_frames {
                    local.last_frames(max_window_frames)
                } else {
                    local.drop_frames(stride_video_frames)
                };
                frames_consumed += frames - next.frames();
                state.video_window = Some(next);
            }

            state.current_gen_offset += stride_tokens;

            // The tail reset above can desynchronize the video window from
            // the audio timeline; surface the drift once instead of
            // silently diverging.
            if state.video_window.is_some() && !alignment_warned {
                let expected_frames =
                    ((state.current_gen_offset as f64 / frame_rate) * fps).round() as i64;
                let drift = expected_frames - frames_consumed as i64;
                if drift.abs() > 1 {
                    eprintln!(
                        "warning: video window is {} frame(s) out of step with the audio timeline",
                        drift
                    );
                    alignment_warned = true;
                }
            }
        }

        let parts: Vec<&TokenSequence> = state.chunks.iter().collect();
        TokenSequence::concat_time(&parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditioning::{ConditioningAttributes, VideoConditioning};
    use crate::error::ErrorCode;
    use crate::models::StepCallback;
    use crate::types::SamplingParams;
    use ndarray::{Array3, Array5};

    /// What the scripted decoder saw on one call.
    #[derive(Debug, Clone, PartialEq)]
    struct CallRecord {
        prompt_len: usize,
        max_gen_len: usize,
        local_frames: Option<usize>,
        /// Value of the first local frame, to distinguish stride-advance
        /// from tail-reset windows.
        local_first: Option<f32>,
    }

    /// Scripted decoder honoring the continuation contract.
    struct ScriptedDecoder {
        calls: Vec<CallRecord>,
    }

    impl ScriptedDecoder {
        fn new() -> Self {
            Self { calls: Vec::new() }
        }
    }

    impl TokenDecoder for ScriptedDecoder {
        fn generate(
            &mut self,
            prompt: Option<&TokenSequence>,
            conditioning: &ConditioningSet,
            max_gen_len: usize,
            _sampling: &SamplingParams,
            mut callback: Option<StepCallback<'_>>,
        ) -> Result<TokenSequence> {
            let prompt_len = prompt.map_or(0, |p| p.time_len());
            let call_index = self.calls.len();
            self.calls.push(CallRecord {
                prompt_len,
                max_gen_len,
                local_frames: conditioning.video.as_ref().map(|v| v.local.frames()),
                local_first: conditioning
                    .video
                    .as_ref()
                    .filter(|v| v.local.frames() > 0)
                    .map(|v| v.local.as_array()[[0, 0, 0, 0, 0]]),
            });

            // Output = prompt prefix + stamped new frames.
            let mut data = Array3::<i64>::zeros((1, 4, prompt_len + max_gen_len));
            if let Some(prompt) = prompt {
                data.slice_mut(ndarray::s![.., .., ..prompt_len])
                    .assign(prompt.as_array());
            }
            for t in 0..max_gen_len {
                let stamp = (call_index * 100_000 + t) as i64;
                for k in 0..4 {
                    data[[0, k, prompt_len + t]] = stamp;
                }
            }

            if let Some(cb) = callback.as_mut() {
                cb(max_gen_len, max_gen_len);
            }

            Ok(TokenSequence::new(data))
        }

        fn video_embedding(&mut self, _conditioning: &ConditioningSet) -> Result<Array3<f32>> {
            Ok(Array3::zeros((1, 1, 8)))
        }

        fn supports_wav_conditioning(&self) -> bool {
            false
        }
    }

    fn config() -> ModelConfig {
        ModelConfig::vidmuse_small()
    }

    fn text_conditioning() -> ConditioningSet {
        ConditioningSet::from_attributes(vec![ConditioningAttributes::new(None, 32000)])
    }

    /// Video conditioning with frame values stamped by index.
    fn video_conditioning(local_frames: usize) -> ConditioningSet {
        let mut local = Array5::<f32>::zeros((1, 2, local_frames, 2, 2));
        for t in 0..local_frames {
            local.slice_mut(ndarray::s![.., .., t, .., ..]).fill(t as f32);
        }
        ConditioningSet::with_video(
            vec![ConditioningAttributes::new(None, 32000)],
            VideoConditioning {
                local: VideoFeatures::new(local),
                global: VideoFeatures::new(Array5::zeros((1, 2, 4, 2, 2))),
            },
        )
    }

    fn prompt_of(len: usize) -> TokenSequence {
        TokenSequence::new(Array3::from_elem((1, 4, len), 7))
    }

    fn generate(
        decoder: &mut ScriptedDecoder,
        conditioning: &ConditioningSet,
        prompt: Option<TokenSequence>,
        params: &GenerationParams,
    ) -> Result<TokenSequence> {
        let config = config();
        let mut controller = WindowedGenerationController::new(decoder, &config);
        let mut observer = crate::generation::NoopProgress;
        controller.generate(conditioning, prompt, params, &mut observer)
    }

    #[test]
    fn single_shot_uses_one_direct_call() {
        // 15s fits inside the 30s context.
        let mut decoder = ScriptedDecoder::new();
        let params = GenerationParams::with_duration(15.0);
        let tokens = generate(&mut decoder, &text_conditioning(), None, &params).unwrap();

        assert_eq!(decoder.calls.len(), 1);
        assert_eq!(decoder.calls[0].max_gen_len, 750);
        assert_eq!(decoder.calls[0].prompt_len, 0);
        assert_eq!(tokens.time_len(), 750);
    }

    #[test]
    fn two_chunks_cover_sixty_seconds() {
        // 60s at stride 29.5 and frame rate 50.
        let mut decoder = ScriptedDecoder::new();
        let params = GenerationParams::with_duration(60.0);
        let tokens = generate(&mut decoder, &text_conditioning(), None, &params).unwrap();

        assert_eq!(decoder.calls.len(), 2);
        assert_eq!(tokens.time_len(), 3000);
        // Chunk 2 is seeded with the 25-token overlap left by the stride.
        assert_eq!(decoder.calls[0].prompt_len, 0);
        assert_eq!(decoder.calls[0].max_gen_len, 1500);
        assert_eq!(decoder.calls[1].prompt_len, 25);
        assert_eq!(decoder.calls[1].max_gen_len, 1500);
    }

    #[test]
    fn output_length_is_exact_for_frame_aligned_durations() {
        // Covers single-shot, clean multi-chunk, and ragged-tail durations.
        for duration in [1.0, 30.0, 31.0, 45.0, 60.0, 61.0, 90.0] {
            let mut decoder = ScriptedDecoder::new();
            let params = GenerationParams::with_duration(duration);
            let tokens = generate(&mut decoder, &text_conditioning(), None, &params).unwrap();
            assert_eq!(
                tokens.time_len(),
                (duration * 50.0) as usize,
                "duration {}",
                duration
            );
        }
    }

    #[test]
    fn chunk_count_stays_within_stride_bound() {
        // The loop never needs more than ceil(total / stride) decoder calls.
        for duration in [35.0, 60.0, 61.0, 90.0, 120.0] {
            let mut decoder = ScriptedDecoder::new();
            let params = GenerationParams::with_duration(duration);
            generate(&mut decoder, &text_conditioning(), None, &params).unwrap();

            let total = (duration * 50.0) as usize;
            let bound = total.div_ceil(1475);
            assert!(
                decoder.calls.len() <= bound,
                "duration {}: {} calls > bound {}",
                duration,
                decoder.calls.len(),
                bound
            );
        }
    }

    #[test]
    fn chunks_join_without_overlap() {
        // The committed suffix of chunk N starts right where chunk N-1's
        // stamped frames end.
        let mut decoder = ScriptedDecoder::new();
        let params = GenerationParams::with_duration(60.0);
        let tokens = generate(&mut decoder, &text_conditioning(), None, &params).unwrap();

        // First chunk committed whole: stamps 0..1500 from call 0.
        assert_eq!(tokens.as_array()[[0, 0, 0]], 0);
        assert_eq!(tokens.as_array()[[0, 0, 1499]], 1499);
        // Second chunk commits only its newly generated frames.
        assert_eq!(tokens.as_array()[[0, 0, 1500]], 100_000);
        assert_eq!(tokens.as_array()[[0, 0, 2999]], 100_000 + 1499);
    }

    #[test]
    fn prompt_seeds_the_output_and_counts_toward_duration() {
        // A 200-token prompt fits the 1500-token context budget.
        let mut decoder = ScriptedDecoder::new();
        let params = GenerationParams::with_duration(30.0);
        let tokens =
            generate(&mut decoder, &text_conditioning(), Some(prompt_of(200)), &params).unwrap();

        assert_eq!(decoder.calls.len(), 1);
        assert_eq!(decoder.calls[0].prompt_len, 200);
        assert_eq!(decoder.calls[0].max_gen_len, 1300);
        assert_eq!(tokens.time_len(), 1500);
        // Output starts with the prompt itself.
        assert_eq!(tokens.as_array()[[0, 0, 0]], 7);
        assert_eq!(tokens.as_array()[[0, 0, 199]], 7);
    }

    #[test]
    fn oversized_prompt_fails_before_any_decoder_call() {
        let mut decoder = ScriptedDecoder::new();
        let params = GenerationParams::with_duration(60.0);
        let err = generate(
            &mut decoder,
            &text_conditioning(),
            Some(prompt_of(1501)),
            &params,
        )
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::PromptTooLong);
        assert!(decoder.calls.is_empty());
    }

    #[test]
    fn invalid_stride_fails_before_any_decoder_call() {
        let mut decoder = ScriptedDecoder::new();
        let mut params = GenerationParams::with_duration(60.0);
        params.extend_stride = 30.0;
        let err = generate(&mut decoder, &text_conditioning(), None, &params).unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidConfiguration);
        assert!(decoder.calls.is_empty());
    }

    #[test]
    fn local_window_is_sliced_to_each_chunk() {
        // 60s of video at 2 fps = 120 local frames.
        let mut decoder = ScriptedDecoder::new();
        let params = GenerationParams::with_duration(60.0);
        generate(&mut decoder, &video_conditioning(120), None, &params).unwrap();

        assert_eq!(decoder.calls.len(), 2);
        // Chunk 1 sees the first 30s window, from frame 0.
        assert_eq!(decoder.calls[0].local_frames, Some(60));
        assert_eq!(decoder.calls[0].local_first, Some(0.0));
        // 120 - 59 = 61 >= 60, so chunk 2's window advanced by the stride.
        assert_eq!(decoder.calls[1].local_frames, Some(60));
        assert_eq!(decoder.calls[1].local_first, Some(59.0));
    }

    #[test]
    fn window_clamps_to_tail_near_the_end() {
        // 60 + 59 - 1 frames puts the window one frame short of another
        // full stride: 118 - 59 = 59 < 60, so the clamp branch runs.
        let mut decoder = ScriptedDecoder::new();
        let params = GenerationParams::with_duration(60.0);
        generate(&mut decoder, &video_conditioning(118), None, &params).unwrap();

        assert_eq!(decoder.calls.len(), 2);
        // Reset to exactly the last 60 frames: 118 - 60 = 58, not the
        // stride-advanced 59.
        assert_eq!(decoder.calls[1].local_frames, Some(60));
        assert_eq!(decoder.calls[1].local_first, Some(58.0));
    }

    #[test]
    fn progress_is_offset_by_committed_chunks() {
        let mut decoder = ScriptedDecoder::new();
        let config = config();
        let params = GenerationParams::with_duration(60.0);
        let conditioning = text_conditioning();

        let mut reports: Vec<(usize, usize)> = Vec::new();
        {
            let mut observer =
                crate::generation::FnObserver(|done: usize, total: usize| reports.push((done, total)));
            let mut controller = WindowedGenerationController::new(&mut decoder, &config);
            controller
                .generate(&conditioning, None, &params, &mut observer)
                .unwrap();
        }

        // The scripted decoder reports once per call at chunk completion;
        // the controller adds the committed offset and the global total.
        assert_eq!(reports, vec![(1500, 3000), (2975, 3000)]);
    }

    #[test]
    fn decoder_errors_propagate_without_partial_results() {
        struct FailingDecoder;
        impl TokenDecoder for FailingDecoder {
            fn generate(
                &mut self,
                _prompt: Option<&TokenSequence>,
                _conditioning: &ConditioningSet,
                _max_gen_len: usize,
                _sampling: &SamplingParams,
                _callback: Option<StepCallback<'_>>,
            ) -> Result<TokenSequence> {
                Err(EngineError::model_inference_failed("out of memory"))
            }
            fn video_embedding(&mut self, _c: &ConditioningSet) -> Result<Array3<f32>> {
                Err(EngineError::model_inference_failed("out of memory"))
            }
            fn supports_wav_conditioning(&self) -> bool {
                false
            }
        }

        let config = config();
        let mut decoder = FailingDecoder;
        let mut controller = WindowedGenerationController::new(&mut decoder, &config);
        let err = controller
            .generate(
                &text_conditioning(),
                None,
                &GenerationParams::with_duration(60.0),
                &mut crate::generation::NoopProgress,
            )
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ModelInferenceFailed);
    }
}
