use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::timeline::{BackgroundMusicRequest, StingerRequest, TimelineRequest};
use crate::catalog;
use crate::cli::{self, Cli};
use crate::error::{RenderError, RenderResult};
use crate::render::animation::TitleAnimation;
use crate::render::background::BackgroundSpec;
use crate::render::palette::{Color, ColorChoice};
use crate::render::title::card_frames;
use crate::render::visualizer::Style;
use crate::subtitle::replace::ReplacementRules;

const CONFIG_FILE_NAME: &str = "sonoframe.toml";
const APP_DIR: &str = "sonoframe";

/// Named width:height ratios with a fixed resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum AspectPreset {
    #[value(name = "16:9")]
    Landscape,
    #[value(name = "9:16")]
    Vertical,
    #[value(name = "1:1")]
    Square,
    #[value(name = "4:5")]
    Portrait,
}

impl AspectPreset {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            AspectPreset::Landscape => (1920, 1080),
            AspectPreset::Vertical => (1080, 1920),
            AspectPreset::Square => (1080, 1080),
            AspectPreset::Portrait => (1080, 1350),
        }
    }
}

/// Encoder speed/size trade-off.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    #[default]
    Ultrafast,
    Fast,
    Medium,
    Slow,
}

impl QualityPreset {
    pub fn x264_preset(self) -> &'static str {
        match self {
            QualityPreset::Ultrafast => "ultrafast",
            QualityPreset::Fast => "fast",
            QualityPreset::Medium => "medium",
            QualityPreset::Slow => "slow",
        }
    }

    pub fn crf(self) -> u32 {
        match self {
            QualityPreset::Ultrafast | QualityPreset::Fast => 23,
            QualityPreset::Medium => 20,
            QualityPreset::Slow => 18,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub subtitle: SubtitleConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub title: TitleConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub quality: Option<QualityPreset>,
    /// Worker threads for rendering and encoding; 0 picks automatically.
    pub threads: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AudioConfig {
    /// Main track volume in percent.
    pub volume: Option<f32>,
    pub bg_music_volume: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubtitleConfig {
    pub font_size: Option<f32>,
    pub max_chars: Option<usize>,
    pub font: Option<PathBuf>,
    pub whisper_model: Option<String>,
    pub language: Option<String>,
    /// Where downloaded speech models are kept.
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BackgroundConfig {
    /// Catalog directory for the random background mode.
    pub dir: Option<PathBuf>,
}

/// Defaults for the intro title card.
#[derive(Debug, Default, Deserialize)]
pub struct TitleConfig {
    pub font: Option<PathBuf>,
    pub color: Option<String>,
    pub animation: Option<TitleAnimation>,
    pub duration: Option<f32>,
}

pub fn load_config(path: &Path) -> RenderResult<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| RenderError::config(format!("cannot read {}: {e}", path.display())))?;
    parse_config(&content).map_err(|e| RenderError::config(format!("{}: {e}", path.display())))
}

pub fn parse_config(content: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(content)
}

/// Explicit path, else `./sonoframe.toml`, else the user config locations.
pub fn find_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join(APP_DIR).join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join(APP_DIR).join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

/// Config values apply only while the CLI is still at its default.
fn layered<T: PartialEq>(cli: T, default: T, file: Option<T>) -> T {
    if cli == default {
        file.unwrap_or(cli)
    } else {
        cli
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AvatarSpec {
    pub path: PathBuf,
    /// Diameter in pixels; `None` picks a quarter of the shorter side.
    pub size: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubtitleSpec {
    pub color: ColorChoice,
    pub font_size: Option<f32>,
    pub max_chars: usize,
    pub font: Option<PathBuf>,
    pub replacements: ReplacementRules,
    /// Finished transcript that replaces transcription.
    pub transcript: Option<PathBuf>,
    pub whisper_model: String,
    pub language: Option<String>,
    pub use_cache: bool,
    pub model_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TitleSpec {
    pub title: String,
    pub subtitle: Option<String>,
    /// Seconds the card is on screen before the main track starts.
    pub duration: f32,
    pub color: Color,
    pub animation: TitleAnimation,
    pub static_card: bool,
    pub background: Option<PathBuf>,
    pub avatar: Option<PathBuf>,
    pub font: Option<PathBuf>,
}

/// Immutable per-render settings shared by every frame.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub style: Style,
    pub background: BackgroundSpec,
    pub wave_color: ColorChoice,
    pub avatar: Option<AvatarSpec>,
    pub subtitles: Option<SubtitleSpec>,
    pub title: Option<TitleSpec>,
    pub aspect: Option<AspectPreset>,
    pub particle_seed: u64,
    /// Seconds the visuals are delayed against the audio.
    pub wave_sync: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutputSpec {
    pub path: PathBuf,
    pub quality: QualityPreset,
    pub audio_only: bool,
    pub thumbnail: Option<PathBuf>,
    /// Clip appended after the visualization.
    pub end_screen: Option<PathBuf>,
    /// 0 lets rayon and ffmpeg decide.
    pub threads: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub render: RenderConfig,
    pub timeline: TimelineRequest,
    pub output: OutputSpec,
}

fn percent(value: f32, option: &str) -> RenderResult<f32> {
    if !value.is_finite() || value < 0.0 {
        return Err(RenderError::config(format!("{option} must be a non-negative percentage, got {value}")));
    }
    Ok(value / 100.0)
}

fn stinger(
    path: &Option<PathBuf>,
    duration: Option<f32>,
    option: &str,
) -> RenderResult<Option<StingerRequest>> {
    if let Some(d) = duration {
        if !d.is_finite() || d <= 0.0 {
            return Err(RenderError::config(format!("--{option}-duration must be positive, got {d}")));
        }
    }
    match (path, duration) {
        (Some(path), max_duration) => Ok(Some(StingerRequest {
            path: path.clone(),
            max_duration,
        })),
        (None, Some(_)) => Err(RenderError::config(format!("--{option}-duration requires --{option}"))),
        (None, None) => Ok(None),
    }
}

impl Settings {
    /// Validate the CLI layered over the config file into the render plan.
    pub fn resolve(cli: &Cli, file: &Config) -> RenderResult<Self> {
        let (width, height) = match cli.aspect {
            Some(preset) => {
                if cli.width != cli::DEFAULT_WIDTH || cli.height != cli::DEFAULT_HEIGHT {
                    return Err(RenderError::config("--aspect cannot be combined with --width/--height"));
                }
                preset.dimensions()
            }
            None => (
                layered(cli.width, cli::DEFAULT_WIDTH, file.output.width),
                layered(cli.height, cli::DEFAULT_HEIGHT, file.output.height),
            ),
        };
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(RenderError::config(format!(
                "width and height must be even and non-zero, got {width}x{height}"
            )));
        }

        let fps = layered(cli.fps, cli::DEFAULT_FPS, file.output.fps);
        if fps == 0 {
            return Err(RenderError::config("--fps must be greater than zero"));
        }

        if cli.audio_only {
            for (set, option) in [
                (cli.thumbnail.is_some(), "--thumbnail"),
                (cli.intro_title.is_some(), "--intro-title"),
                (cli.end_screen.is_some(), "--end-screen"),
            ] {
                if set {
                    return Err(RenderError::config(format!("{option} cannot be used with --audio-only")));
                }
            }
        }
        if !cli.wave_sync.is_finite() {
            return Err(RenderError::config("--wave-sync must be a number of seconds"));
        }

        let background = BackgroundSpec::parse(&cli.bg, cli.bg_value.as_deref(), || {
            file.background.dir.clone().unwrap_or_else(catalog::default_dir)
        })?;
        let wave_color: ColorChoice = cli
            .wave_color
            .parse()
            .map_err(|e| RenderError::config(format!("--wave-color: {e}")))?;

        if cli.avatar_size == Some(0) {
            return Err(RenderError::config("--avatar-size must be positive"));
        }
        let avatar = cli.avatar.as_ref().map(|path| AvatarSpec {
            path: path.clone(),
            size: cli.avatar_size,
        });

        let subtitles = if cli.subtitles || cli.transcript.is_some() {
            Some(Self::subtitle_spec(cli, file)?)
        } else {
            None
        };

        let title = Self::title_spec(cli, file)?;

        let volume = layered(cli.volume, cli::DEFAULT_VOLUME, file.audio.volume);
        let bg_music_volume = layered(cli.bg_music_volume, cli::DEFAULT_BG_MUSIC_VOLUME, file.audio.bg_music_volume);
        let timeline = TimelineRequest {
            main: cli.input.clone(),
            main_volume: percent(volume, "--volume")?,
            intro: stinger(&cli.intro, cli.intro_duration, "intro")?,
            outro: stinger(&cli.outro, cli.outro_duration, "outro")?,
            bg_music: match &cli.bg_music {
                Some(path) => Some(BackgroundMusicRequest {
                    path: path.clone(),
                    volume: percent(bg_music_volume, "--bg-music-volume")?,
                }),
                None => None,
            },
            pre_roll: title
                .as_ref()
                .map_or(0.0, |t| card_frames(t.duration, fps) as f64 / fps as f64),
        };

        let quality = layered(cli.quality, QualityPreset::default(), file.output.quality);
        let threads = cli.threads.or(file.output.threads).unwrap_or(0);

        Ok(Self {
            render: RenderConfig {
                width,
                height,
                fps,
                style: cli.style,
                background,
                wave_color,
                avatar,
                subtitles,
                title,
                aspect: cli.aspect,
                particle_seed: cli.seed,
                wave_sync: cli.wave_sync,
            },
            timeline,
            output: OutputSpec {
                path: cli.output.clone(),
                quality,
                audio_only: cli.audio_only,
                thumbnail: cli.thumbnail.clone(),
                end_screen: cli.end_screen.clone(),
                threads,
            },
        })
    }

    fn title_spec(cli: &Cli, file: &Config) -> RenderResult<Option<TitleSpec>> {
        let Some(title) = cli.intro_title.clone() else {
            for (set, option) in [
                (cli.intro_subtitle.is_some(), "--intro-subtitle"),
                (cli.intro_static, "--intro-static"),
                (cli.intro_bg.is_some(), "--intro-bg"),
                (cli.intro_avatar.is_some(), "--intro-avatar"),
                (cli.intro_card_duration.is_some(), "--intro-card-duration"),
            ] {
                if set {
                    return Err(RenderError::config(format!("{option} requires --intro-title")));
                }
            }
            return Ok(None);
        };
        if title.trim().is_empty() {
            return Err(RenderError::config("--intro-title must not be empty"));
        }

        let duration = cli
            .intro_card_duration
            .or(file.title.duration)
            .unwrap_or(crate::render::title::DEFAULT_CARD_DURATION);
        if !duration.is_finite() || duration <= 0.0 {
            return Err(RenderError::config(format!(
                "intro card duration must be positive, got {duration}"
            )));
        }
        let color = cli
            .intro_title_color
            .as_deref()
            .or(file.title.color.as_deref())
            .unwrap_or("#ffffff");
        let color = Color::from_hex(color).map_err(|e| RenderError::config(format!("--intro-title-color: {e}")))?;

        Ok(Some(TitleSpec {
            title,
            subtitle: cli.intro_subtitle.clone(),
            duration,
            color,
            animation: cli.intro_animation.or(file.title.animation).unwrap_or_default(),
            static_card: cli.intro_static,
            background: cli.intro_bg.clone(),
            avatar: cli.intro_avatar.clone(),
            font: cli.intro_font.clone().or_else(|| file.title.font.clone()),
        }))
    }

    fn subtitle_spec(cli: &Cli, file: &Config) -> RenderResult<SubtitleSpec> {
        let color: ColorChoice = cli
            .subtitle_color
            .parse()
            .map_err(|e| RenderError::config(format!("--subtitle-color: {e}")))?;

        let font_size = cli.subtitle_font_size.or(file.subtitle.font_size);
        if let Some(size) = font_size {
            if !size.is_finite() || size <= 0.0 {
                return Err(RenderError::config(format!("subtitle font size must be positive, got {size}")));
            }
        }
        let max_chars = layered(
            cli.subtitle_max_chars,
            crate::subtitle::segment::DEFAULT_MAX_CHARS,
            file.subtitle.max_chars,
        );
        if max_chars == 0 {
            return Err(RenderError::config("--subtitle-max-chars must be positive"));
        }

        let mut replacements = ReplacementRules::new();
        if let Some(path) = &cli.replace_file {
            replacements.load_file(path)?;
        }
        for rule in &cli.replacements {
            replacements.push_inline(rule)?;
        }

        Ok(SubtitleSpec {
            color,
            font_size,
            max_chars,
            font: cli.font.clone().or_else(|| file.subtitle.font.clone()),
            replacements,
            transcript: cli.transcript.clone(),
            whisper_model: layered(
                cli.whisper_model.clone(),
                cli::DEFAULT_WHISPER_MODEL.to_string(),
                file.subtitle.whisper_model.clone(),
            ),
            language: cli.subtitle_lang.clone().or_else(|| file.subtitle.language.clone()),
            use_cache: !cli.no_transcript_cache,
            model_dir: file.subtitle.cache_dir.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["sonoframe", "main.wav"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn resolve(args: &[&str]) -> RenderResult<Settings> {
        Settings::resolve(&cli(args), &Config::default())
    }

    fn assert_config_error(args: &[&str]) {
        match resolve(args) {
            Err(RenderError::Configuration(_)) => {}
            other => panic!("{args:?}: expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn defaults_resolve() {
        let s = resolve(&[]).unwrap();
        assert_eq!((s.render.width, s.render.height, s.render.fps), (1920, 1080, 30));
        assert_eq!(s.render.style, Style::Waveform);
        assert!(s.render.subtitles.is_none());
        assert!(s.render.avatar.is_none());
        assert_eq!(s.timeline, TimelineRequest::main_only("main.wav"));
        assert_eq!(s.output.quality, QualityPreset::Ultrafast);
    }

    #[test]
    fn aspect_presets_map_to_resolutions() {
        for (name, dims) in [
            ("16:9", (1920, 1080)),
            ("9:16", (1080, 1920)),
            ("1:1", (1080, 1080)),
            ("4:5", (1080, 1350)),
        ] {
            let s = resolve(&["--aspect", name]).unwrap();
            assert_eq!((s.render.width, s.render.height), dims, "{name}");
        }
    }

    #[test]
    fn invalid_combinations_are_configuration_errors() {
        assert_config_error(&["--aspect", "1:1", "--width", "640"]);
        assert_config_error(&["--width", "641"]);
        assert_config_error(&["--fps", "0"]);
        assert_config_error(&["--audio-only", "--thumbnail", "t.png"]);
        assert_config_error(&["--intro", "i.wav", "--intro-duration", "-1"]);
        assert_config_error(&["--outro-duration", "2"]);
        assert_config_error(&["--bg", "plasma"]);
        assert_config_error(&["--wave-color", "#12"]);
        assert_config_error(&["--volume", "-5"]);
        assert_config_error(&["--subtitles", "--replace", "noequals"]);
        assert_config_error(&["--avatar", "a.png", "--avatar-size", "0"]);
        assert_config_error(&["--intro-subtitle", "part two"]);
        assert_config_error(&["--intro-title", "Hi", "--intro-card-duration", "0"]);
        assert_config_error(&["--intro-title", "Hi", "--intro-title-color", "white"]);
        assert_config_error(&["--intro-title", " "]);
        assert_config_error(&["--audio-only", "--intro-title", "Hi"]);
        assert_config_error(&["--audio-only", "--end-screen", "end.mp4"]);
    }

    #[test]
    fn title_card_delays_the_main_track_by_whole_frames() {
        let s = resolve(&[
            "--intro-title",
            "Weekly notes",
            "--intro-subtitle",
            "Episode 3",
            "--intro-card-duration",
            "2.5",
            "--intro-animation",
            "typewriter",
            "--fps",
            "24",
        ])
        .unwrap();
        let title = s.render.title.unwrap();
        assert_eq!(title.title, "Weekly notes");
        assert_eq!(title.subtitle.as_deref(), Some("Episode 3"));
        assert_eq!(title.animation, TitleAnimation::Typewriter);
        assert_eq!(title.color, Color::WHITE);
        assert!(!title.static_card);
        // 2.5s at 24fps is 60 frames.
        assert!((s.timeline.pre_roll - 2.5).abs() < 1e-12);

        let plain = resolve(&[]).unwrap();
        assert!(plain.render.title.is_none());
        assert_eq!(plain.timeline.pre_roll, 0.0);
    }

    #[test]
    fn output_extras_are_carried() {
        let s = resolve(&["--thumbnail", "cover.jpg", "--end-screen", "end.mp4", "--threads", "3"]).unwrap();
        assert_eq!(s.output.thumbnail, Some(PathBuf::from("cover.jpg")));
        assert_eq!(s.output.end_screen, Some(PathBuf::from("end.mp4")));
        assert_eq!(s.output.threads, 3);
        assert_eq!(resolve(&[]).unwrap().output.threads, 0);
    }

    #[test]
    fn audio_options_build_the_timeline_request() {
        let s = resolve(&[
            "--intro",
            "intro.wav",
            "--intro-duration",
            "2",
            "--outro",
            "outro.wav",
            "--bg-music",
            "bed.mp3",
            "--bg-music-volume",
            "20",
            "--volume",
            "80",
        ])
        .unwrap();
        let t = s.timeline;
        assert_eq!(t.main_volume, 0.8);
        assert_eq!(
            t.intro,
            Some(StingerRequest {
                path: "intro.wav".into(),
                max_duration: Some(2.0)
            })
        );
        assert_eq!(t.outro.map(|o| o.max_duration), Some(None));
        let bg = t.bg_music.unwrap();
        assert_eq!(bg.path, PathBuf::from("bed.mp3"));
        assert!((bg.volume - 0.2).abs() < 1e-6);
    }

    #[test]
    fn subtitle_options_collect_replacements_in_order() {
        let s = resolve(&["--subtitles", "--replace", "a=b", "--replace", "c=d", "--subtitle-color", "auto"]).unwrap();
        let sub = s.render.subtitles.unwrap();
        assert_eq!(sub.color, ColorChoice::Auto);
        assert_eq!(sub.replacements.apply("a c"), "b d");
        assert_eq!(sub.whisper_model, "base");
        assert!(sub.use_cache);
    }

    #[test]
    fn transcript_file_enables_subtitles() {
        let s = resolve(&["--transcript", "t.json"]).unwrap();
        assert_eq!(s.render.subtitles.unwrap().transcript, Some(PathBuf::from("t.json")));
    }

    #[test]
    fn config_file_fills_cli_defaults_only() {
        let file = parse_config(
            r##"
            [output]
            width = 1280
            height = 720
            fps = 25
            quality = "slow"

            [audio]
            volume = 50.0

            [subtitle]
            whisper_model = "small"
            max_chars = 30

            cache_dir = "/srv/models"

            [background]
            dir = "/srv/backgrounds"

            [title]
            color = "#ffcc00"
            animation = "slide-up"
            duration = 4.0
            "##,
        )
        .unwrap();

        let s = Settings::resolve(
            &cli(&["--fps", "60", "--subtitles", "--bg", "random", "--intro-title", "Hi"]),
            &file,
        )
        .unwrap();
        assert_eq!((s.render.width, s.render.height), (1280, 720));
        assert_eq!(s.render.fps, 60);
        assert_eq!(s.output.quality, QualityPreset::Slow);
        assert_eq!(s.timeline.main_volume, 0.5);
        let sub = s.render.subtitles.unwrap();
        assert_eq!(sub.whisper_model, "small");
        assert_eq!(sub.max_chars, 30);
        assert_eq!(sub.model_dir, Some(PathBuf::from("/srv/models")));
        let title = s.render.title.unwrap();
        assert_eq!(title.color, Color::rgb(0xff, 0xcc, 0x00));
        assert_eq!(title.animation, TitleAnimation::SlideUp);
        assert_eq!(title.duration, 4.0);
        assert!((s.timeline.pre_roll - 4.0).abs() < 1e-12);
        assert_eq!(s.render.background, BackgroundSpec::Random(PathBuf::from("/srv/backgrounds")));
    }

    #[test]
    fn empty_config_file_is_valid() {
        let cfg = parse_config("").unwrap();
        assert!(cfg.output.width.is_none());
        assert!(cfg.background.dir.is_none());
    }

    #[test]
    fn malformed_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[output]\nwidth = \"wide\"\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn explicit_config_path_wins() {
        let path = PathBuf::from("/tmp/custom.toml");
        assert_eq!(find_config_path(Some(path.as_path())), Some(path));
    }

    #[test]
    fn quality_presets_map_to_x264() {
        assert_eq!(QualityPreset::Ultrafast.x264_preset(), "ultrafast");
        assert_eq!(QualityPreset::Slow.crf(), 18);
        assert_eq!(QualityPreset::Medium.crf(), 20);
    }
}
