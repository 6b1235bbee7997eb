mod audio;
mod catalog;
mod cli;
mod config;
mod encode;
mod error;
mod render;
mod subtitle;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use image::{DynamicImage, RgbaImage};
use indicatif::{ProgressBar, ProgressStyle};

use audio::analysis::extract;
use audio::decode::{decode_audio, AudioData};
use audio::features::AudioFeatureFrame;
use audio::timeline::{compose, MixedAudio};
use cli::Cli;
use config::{Config, RenderConfig, Settings, SubtitleSpec};
use encode::ffmpeg::{append_end_screen, embed_cover_art, encode_audio_only, EncodeConfig, FfmpegEncoder};
use error::{RenderError, RenderResult};
use render::overlay::{default_avatar_size, Avatar};
use render::palette::{auto_subtitle_color, auto_wave_color};
use render::sequencer::{self, FrameComposer, VideoTimeline};
use render::text::TextOverlay;
use render::title::{title_font_size, TitleCard};
use render::visualizer::StyleContext;
use subtitle::index::SubtitleIndex;
use subtitle::render::{default_font_size, SubtitleRenderer};
use subtitle::segment::{reflow, CueLimits, SubtitleSegment};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let file_config = match config::find_config_path(cli.config.as_deref()) {
        Some(path) => {
            let cfg = config::load_config(&path)?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => Config::default(),
    };
    let settings = Settings::resolve(&cli, &file_config)?;

    let pool = sequencer::thread_pool(settings.output.threads)?;
    pool.install(|| run(&settings))
}

fn run(settings: &Settings) -> Result<()> {
    let render_cfg = &settings.render;
    let output = &settings.output;
    let input = &settings.timeline.main;

    log::info!("sonoframe - audio visualization renderer");
    log::info!("Input: {}", input.display());
    log::info!("Output: {}", output.path.display());
    if !output.audio_only {
        log::info!(
            "Style: {}, Resolution: {}x{} @ {}fps",
            render_cfg.style,
            render_cfg.width,
            render_cfg.height,
            render_cfg.fps
        );
        if let Some(aspect) = render_cfg.aspect {
            log::info!("Aspect preset: {:?}", aspect);
        }
    }

    // 1. Decode the main track
    let audio = decode_audio(input)?;
    log::info!(
        "Decoded {:.2}s at {}Hz ({} samples)",
        audio.duration(),
        audio.sample_rate,
        audio.samples.len()
    );

    // 2. Mix the timeline while the feature table is extracted
    let (mix, features) = rayon::join(
        || compose(&settings.timeline, &audio),
        || {
            if output.audio_only {
                Ok(Vec::new())
            } else {
                extract(&audio.samples, audio.sample_rate, render_cfg.fps, audio.duration())
            }
        },
    );
    let mix = mix?;
    let features = features?;

    let mix_file = tempfile::Builder::new()
        .prefix("sonoframe-mix-")
        .suffix(".wav")
        .tempfile()
        .context("Failed to create temporary mix file")?;
    mix.write_wav(mix_file.path())?;

    if output.audio_only {
        encode_audio_only(mix_file.path(), &output.path)?;
        log::info!("Done! Output: {}", output.path.display());
        return Ok(());
    }
    log::info!("Feature table: {} frames", features.len());

    render_video(settings, &audio, &mix, &features, mix_file.path())?;
    log::info!("Done! Output: {}", output.path.display());
    Ok(())
}

fn render_video(
    settings: &Settings,
    audio: &AudioData,
    mix: &MixedAudio,
    features: &[AudioFeatureFrame],
    mix_path: &Path,
) -> Result<()> {
    let cfg = &settings.render;
    let (width, height) = (cfg.width, cfg.height);

    // 3. Background and colors
    let mut rng = rand::rng();
    let background = render::background::resolve(&cfg.background, width, height, &mut rng)?;
    let wave_color = cfg.wave_color.resolve(|| auto_wave_color(&background));
    log::info!("Wave color: {}", wave_color);

    // 4. Avatar
    let avatar = match &cfg.avatar {
        Some(spec) => Some(Avatar::load(
            &spec.path,
            spec.size.unwrap_or_else(|| default_avatar_size(width, height)),
        )?),
        None => None,
    };

    let timeline = VideoTimeline::new(mix.samples.len(), mix.main_offset, mix.sample_rate, cfg.wave_sync, cfg.fps);
    log::info!(
        "Video: {} frames ({:.2}s), main track starts at {:.2}s",
        timeline.total_frames,
        timeline.duration(),
        mix.lead_seconds()
    );

    // 5. Intro title card
    let card = match &cfg.title {
        Some(spec) => {
            let font = TextOverlay::discover(spec.font.as_deref(), title_font_size(width))?;
            Some(TitleCard::new(spec, &background, font, cfg.fps)?)
        }
        None => None,
    };

    // 6. Subtitles
    let subtitles = match &cfg.subtitles {
        Some(spec) => Some(build_subtitles(
            spec,
            cfg,
            &settings.timeline.main,
            audio,
            &background,
            &timeline,
            mix.lead_seconds(),
        )?),
        None => None,
    };

    let composer = FrameComposer {
        style: cfg.style,
        ctx: StyleContext {
            width,
            height,
            fps: cfg.fps,
            color: wave_color,
            avatar_radius: avatar.as_ref().map(|a| a.size() as f32 / 2.0),
        },
        background: &background,
        avatar: avatar.as_ref(),
        subtitles: subtitles.as_ref(),
        title: card.as_ref(),
    };

    // 7. Thumbnail
    if let Some(path) = &settings.output.thumbnail {
        let index = match &card {
            Some(card) => (2 * cfg.fps as usize).min(card.frame_count().saturating_sub(1)),
            None => timeline.lead_frames,
        };
        let still = sequencer::still(&composer, features, &timeline, index, cfg.particle_seed);
        save_thumbnail(still, path)?;
    }

    // 8. Render and encode
    let encode_cfg = EncodeConfig {
        width,
        height,
        fps: cfg.fps,
        quality: settings.output.quality,
        out_path: settings.output.path.clone(),
        threads: settings.output.threads,
    };
    let mut encoder = FfmpegEncoder::new(encode_cfg.clone(), mix_path)?;

    let pb = ProgressBar::new(timeline.total_frames as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );

    sequencer::run(&composer, features, &timeline, cfg.particle_seed, &mut encoder, &pb)?;
    pb.finish_with_message("Rendering complete");

    log::info!("Finishing encoding...");
    encoder.finish()?;

    // 9. Post-processing on the finished file
    if let Some(clip) = &settings.output.end_screen {
        append_end_screen(&encode_cfg, clip)?;
    }
    if let Some(thumbnail) = &settings.output.thumbnail {
        if let Err(e) = embed_cover_art(&encode_cfg.out_path, thumbnail) {
            log::warn!("Could not embed cover art: {}", e);
        }
    }
    Ok(())
}

fn save_thumbnail(frame: RgbaImage, path: &Path) -> RenderResult<()> {
    DynamicImage::ImageRgba8(frame)
        .to_rgb8()
        .save(path)
        .map_err(|e| RenderError::invalid_image(path, e))?;
    log::info!("Thumbnail saved to {}", path.display());
    Ok(())
}

fn transcript_segments(spec: &SubtitleSpec, main_path: &Path, audio: &AudioData) -> RenderResult<Vec<SubtitleSegment>> {
    if let Some(path) = &spec.transcript {
        let segments = subtitle::transcribe::load_transcript(path)?;
        log::info!("Loaded {} transcript segments from {}", segments.len(), path.display());
        return Ok(segments);
    }
    transcribe(spec, main_path, audio)
}

#[cfg(feature = "subtitles")]
fn transcribe(spec: &SubtitleSpec, main_path: &Path, audio: &AudioData) -> RenderResult<Vec<SubtitleSegment>> {
    use subtitle::cache::{transcribe_cached, TranscriptCache};
    use subtitle::model::ModelStore;
    use subtitle::transcribe::WhisperTranscriber;

    log::info!("Transcribing audio for subtitles...");
    let store = ModelStore::locate(spec.model_dir.as_deref())?;
    log::debug!("Model store: {}", store.dir().display());
    let model_path = store.resolve(&spec.whisper_model)?;
    let transcriber = WhisperTranscriber::new(&model_path, &spec.whisper_model, spec.language.as_deref())?;
    let cache = if spec.use_cache {
        TranscriptCache::default_location()
    } else {
        None
    };
    transcribe_cached(&transcriber, main_path, audio, cache.as_ref())
}

#[cfg(not(feature = "subtitles"))]
fn transcribe(_spec: &SubtitleSpec, _main_path: &Path, _audio: &AudioData) -> RenderResult<Vec<SubtitleSegment>> {
    Err(RenderError::transcription(
        "transcription requires the 'subtitles' feature; rebuild with `--features subtitles` or pass --transcript",
    ))
}

fn build_subtitles(
    spec: &SubtitleSpec,
    cfg: &RenderConfig,
    main_path: &Path,
    audio: &AudioData,
    background: &RgbaImage,
    timeline: &VideoTimeline,
    lead: f64,
) -> RenderResult<SubtitleRenderer> {
    let mut segments = transcript_segments(spec, main_path, audio)?;
    if !spec.replacements.is_empty() {
        log::info!("Applying {} text replacement rules", spec.replacements.len());
        spec.replacements.apply_all(&mut segments);
    }
    let segments = reflow(segments, &CueLimits::new(spec.max_chars));
    for (i, s) in segments.iter().enumerate() {
        log::debug!("  [{:3}] {:.2}s - {:.2}s  {:?}", i, s.start, s.end, s.text);
    }

    let font_size = spec.font_size.unwrap_or_else(|| default_font_size(cfg.height));
    let overlay = TextOverlay::discover(spec.font.as_deref(), font_size)?;

    let color = spec.color.resolve(|| auto_subtitle_color(background));
    let index = SubtitleIndex::build(&segments, cfg.fps, timeline.total_frames, lead);
    log::info!(
        "Subtitles: {} segments on {} frames, color {}",
        segments.len(),
        index.covered_frames(),
        color
    );
    Ok(SubtitleRenderer::new(segments, index, overlay, color))
}
