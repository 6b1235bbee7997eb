use clap::Parser;
use std::path::PathBuf;

use crate::config::{AspectPreset, QualityPreset};
use crate::render::animation::TitleAnimation;
use crate::render::visualizer::{particles, Style};

pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;
pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_VOLUME: f32 = 100.0;
pub const DEFAULT_BG_MUSIC_VOLUME: f32 = 15.0;
pub const DEFAULT_WHISPER_MODEL: &str = "base";

#[derive(Parser, Debug)]
#[command(name = "sonoframe", version, about = "Render an audio track into a visualization video")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG, AAC)
    pub input: PathBuf,

    /// Output file (video, or audio with --audio-only)
    #[arg(short, long, default_value = "output.mp4")]
    pub output: PathBuf,

    /// Config file (default: ./sonoframe.toml, then ~/.config/sonoframe/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Visualization style
    #[arg(short, long, value_enum, default_value_t = Style::Waveform)]
    pub style: Style,

    /// Background mode: color, gradient, image or random
    #[arg(long = "bg", default_value = "color")]
    pub bg: String,

    /// Background value: hex color, "#from,#to[,axis]" for gradient, image path,
    /// or a directory for random
    #[arg(long)]
    pub bg_value: Option<String>,

    /// Wave color (hex) or "auto" to derive it from the background
    #[arg(long, default_value = "#00d4ff")]
    pub wave_color: String,

    /// Video width in pixels
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    pub width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    pub height: u32,

    /// Aspect preset; replaces --width/--height
    #[arg(long, value_enum)]
    pub aspect: Option<AspectPreset>,

    /// Frames per second
    #[arg(long, default_value_t = DEFAULT_FPS)]
    pub fps: u32,

    /// Avatar image pasted as a circle at the center
    #[arg(long)]
    pub avatar: Option<PathBuf>,

    /// Avatar diameter in pixels (default: 1/4 of the shorter side)
    #[arg(long)]
    pub avatar_size: Option<u32>,

    /// Burn in subtitles from a transcription of the main track
    #[arg(long, alias = "subtitle")]
    pub subtitles: bool,

    /// Subtitle color (hex) or "auto"
    #[arg(long, default_value = "#ffffff")]
    pub subtitle_color: String,

    /// Subtitle font size in pixels (default: height/20, at least 24)
    #[arg(long)]
    pub subtitle_font_size: Option<f32>,

    /// Maximum characters per subtitle cue
    #[arg(long, default_value_t = crate::subtitle::segment::DEFAULT_MAX_CHARS)]
    pub subtitle_max_chars: usize,

    /// Language code for transcription (e.g. "en"); auto-detected when unset
    #[arg(long)]
    pub subtitle_lang: Option<String>,

    /// Whisper model name (tiny, base, small, medium, large) or a .bin path
    #[arg(long, default_value = DEFAULT_WHISPER_MODEL)]
    pub whisper_model: String,

    /// Use a finished transcript (JSON array of {start, end, text}) instead of transcribing
    #[arg(long)]
    pub transcript: Option<PathBuf>,

    /// Do not read or write the transcript cache
    #[arg(long)]
    pub no_transcript_cache: bool,

    /// Subtitle text replacement "old=new" (repeatable)
    #[arg(long = "replace", value_name = "OLD=NEW")]
    pub replacements: Vec<String>,

    /// File with one "old=new" replacement per line ("#" starts a comment)
    #[arg(long)]
    pub replace_file: Option<PathBuf>,

    /// Font file (TTF/OTF) for subtitles
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Intro audio played before the main track
    #[arg(long)]
    pub intro: Option<PathBuf>,

    /// Use at most this many seconds of the intro
    #[arg(long, allow_negative_numbers = true)]
    pub intro_duration: Option<f32>,

    /// Outro audio played after the main track
    #[arg(long)]
    pub outro: Option<PathBuf>,

    /// Use at most this many seconds of the outro
    #[arg(long, allow_negative_numbers = true)]
    pub outro_duration: Option<f32>,

    /// Background music looped under the whole mix
    #[arg(long)]
    pub bg_music: Option<PathBuf>,

    /// Background music volume in percent
    #[arg(long, default_value_t = DEFAULT_BG_MUSIC_VOLUME, allow_negative_numbers = true)]
    pub bg_music_volume: f32,

    /// Main track volume in percent
    #[arg(long, default_value_t = DEFAULT_VOLUME, allow_negative_numbers = true)]
    pub volume: f32,

    /// Shift the visualization against the audio in seconds (positive delays it)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub wave_sync: f32,

    /// Encoder quality preset
    #[arg(short, long, value_enum, default_value_t = QualityPreset::Ultrafast)]
    pub quality: QualityPreset,

    /// Write only the audio mix
    #[arg(long)]
    pub audio_only: bool,

    /// Save a frame as an image and embed it as the video's cover art
    #[arg(long)]
    pub thumbnail: Option<PathBuf>,

    /// Seed for the particle style
    #[arg(long, default_value_t = particles::DEFAULT_SEED)]
    pub seed: u64,

    /// Show a title card before the visualization
    #[arg(long)]
    pub intro_title: Option<String>,

    /// Smaller second line under the intro title
    #[arg(long)]
    pub intro_subtitle: Option<String>,

    /// Title card length in seconds (default: 3)
    #[arg(long, allow_negative_numbers = true)]
    pub intro_card_duration: Option<f32>,

    /// Title text color (hex)
    #[arg(long)]
    pub intro_title_color: Option<String>,

    /// How the title enters
    #[arg(long, value_enum)]
    pub intro_animation: Option<TitleAnimation>,

    /// Show the title card without animation
    #[arg(long)]
    pub intro_static: bool,

    /// Background image for the title card (default: the main background)
    #[arg(long)]
    pub intro_bg: Option<PathBuf>,

    /// Avatar shown above the title
    #[arg(long)]
    pub intro_avatar: Option<PathBuf>,

    /// Font file (TTF/OTF) for the title card
    #[arg(long)]
    pub intro_font: Option<PathBuf>,

    /// Video clip appended after the visualization
    #[arg(long)]
    pub end_screen: Option<PathBuf>,

    /// Worker threads for rendering and ffmpeg (default: all cores)
    #[arg(long)]
    pub threads: Option<usize>,
}
