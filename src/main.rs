//! vidmuse: long-form video-to-music generation CLI.
//!
//! Loads the ONNX model ensemble, assembles conditioning from the
//! command-line inputs, and writes the generated audio as a WAV file.

use std::time::Instant;

use ndarray::Axis;

use vidmuse::audio::{read_wav, samples_to_duration, write_wav};
use vidmuse::cli::Cli;
use vidmuse::conditioning::{VideoConditioning, VideoFeatures};
use vidmuse::config::EngineConfig;
use vidmuse::error::Result;
use vidmuse::generation::{FnObserver, GenerationSession};
use vidmuse::models::{ensure_models, load_models};
use vidmuse::types::{GenerationParams, SamplingParams};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();

    if !cli.has_input() {
        print_usage();
        return Ok(());
    }

    let mut config = EngineConfig::from_env();
    config.device = cli.device.into();
    config.precision = cli.precision.into();
    if cli.model_dir.is_some() {
        config.model_path = cli.model_dir.clone();
    }

    let model_dir = config.effective_model_path();
    let output_path = cli.output_path();

    eprintln!("=== vidmuse ===");
    if let Some(prompt) = &cli.prompt {
        eprintln!("Prompt: \"{}\"", prompt);
    }
    if let Some(video) = &cli.video {
        eprintln!("Video features: {}", video.display());
    }
    if let Some(wav) = &cli.continue_wav {
        eprintln!("Continuing: {}", wav.display());
    }
    eprintln!("Duration: {}s (stride {}s)", cli.duration, cli.stride);
    eprintln!("Output: {}", output_path.display());
    eprintln!("Model directory: {}", model_dir.display());
    if let Some(seed) = cli.seed {
        eprintln!("Seed: {}", seed);
    }
    eprintln!();

    // Ensure models are downloaded
    eprintln!("Checking model files...");
    ensure_models(&model_dir)?;
    eprintln!();

    let models = load_models(&model_dir, &config.execution_context())?;
    let sample_rate = models.config.sample_rate;
    let mut session = GenerationSession::from_models(models)?;

    session.set_generation_params(GenerationParams {
        duration: cli.duration,
        extend_stride: cli.stride,
        sampling: SamplingParams {
            use_sampling: !cli.greedy,
            top_k: cli.top_k,
            top_p: cli.top_p,
            temperature: cli.temperature,
            cfg_coef: cli.cfg_coef,
            two_step_cfg: cli.two_step_cfg,
            seed: cli.seed,
        },
    })?;

    // Console progress lives here, not in the controller.
    session.set_progress_observer(Box::new(FnObserver(|done: usize, total: usize| {
        eprint!("\r{:6} / {:6} tokens", done, total);
    })));

    let start_time = Instant::now();

    let tokens = if let Some(video_path) = &cli.video {
        let local = VideoFeatures::load(video_path)?;
        let global = match &cli.video_global {
            Some(path) => VideoFeatures::load(path)?,
            None => local.clone(),
        };
        let video = VideoConditioning { local, global };

        if cli.embedding {
            let embedding = session.generate_video_embedding(video)?;
            write_embedding(&embedding, &output_path)?;
            eprintln!(
                "Wrote video embedding {:?} to {}",
                embedding.dim(),
                output_path.display()
            );
            return Ok(());
        }

        session.generate(video, &[cli.prompt.clone()], true)?
    } else if let Some(wav_path) = &cli.continue_wav {
        let (prompt, prompt_rate) = read_wav(wav_path)?;
        let descriptions = cli.prompt.clone().map(|p| vec![Some(p)]);
        session.generate_continuation(
            &prompt.into_dyn(),
            prompt_rate,
            descriptions.as_deref(),
            true,
        )?
    } else {
        session.generate_with_descriptions(&[cli.prompt.clone()], true)?
    };
    eprintln!();

    eprintln!("Generated {} tokens, decoding audio...", tokens.time_len());
    let audio = session.generate_audio(&tokens)?;

    // Mono model output: write channel 0 of batch 0.
    let samples: Vec<f32> = audio
        .index_axis(Axis(0), 0)
        .row(0)
        .iter()
        .copied()
        .collect();

    write_wav(&samples, &output_path, sample_rate)?;

    eprintln!(
        "Wrote {} ({:.2}s at {}Hz) in {:.1}s",
        output_path.display(),
        samples_to_duration(samples.len(), sample_rate),
        sample_rate,
        start_time.elapsed().as_secs_f32()
    );

    Ok(())
}

/// Writes an embedding tensor as raw little-endian f32.
fn write_embedding(embedding: &ndarray::Array3<f32>, path: &std::path::Path) -> Result<()> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding.iter() {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    std::fs::write(path, bytes).map_err(|e| {
        vidmuse::error::EngineError::model_inference_failed(format!(
            "Failed to write embedding {}: {}",
            path.display(),
            e
        ))
    })
}

fn print_usage() {
    eprintln!("vidmuse: long-form video-to-music generation");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  vidmuse --prompt \"calm piano over rain\" --duration 60 -o out.wav");
    eprintln!("  vidmuse --video features.json --duration 120 -o out.wav");
    eprintln!("  vidmuse --continue-wav intro.wav --duration 45 -o out.wav");
    eprintln!("  vidmuse --video features.json --embedding -o embedding.f32");
    eprintln!();
    eprintln!("Run with --help for the full flag list.");
}
