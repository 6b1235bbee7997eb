//! Final audio mix: main track anchored on the timeline, optional intro/outro
//! stingers overlapping its edges, and a looped background-music bed.
//!
//! Placement is planned in whole samples at the main track's rate; seconds
//! only appear in the tuning constants and in log output.

use std::path::{Path, PathBuf};

use super::decode::{decode_audio, AudioData};
use super::loudness::{normalization_gain, TARGET_LUFS};
use super::resample::resample;
use crate::error::{RenderError, RenderResult};

/// Plateau level of intro/outro relative to the normalized main track.
pub const STINGER_LEVEL: f32 = 0.6;
/// Fade at the outer edges of the stingers (intro start, outro end).
pub const STINGER_EDGE_FADE: f64 = 0.5;
pub const INTRO_MAX_OVERLAP: f64 = 3.0;
pub const MAIN_FADE_IN_WITH_INTRO: f64 = 3.0;
pub const OUTRO_MAX_OVERLAP: f64 = 10.0;
pub const BG_MUSIC_EDGE_FADE: f64 = 1.0;

/// Samples never exceed this magnitude after limiting.
pub const MIX_CEILING: f32 = 0.98;
const LIMITER_KNEE: f32 = 0.9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipRole {
    Intro,
    Main,
    Outro,
    BackgroundMusic,
}

/// One source placed on the timeline. Offsets, lengths and fades are in
/// samples at the mix rate.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioClipSpec {
    pub role: ClipRole,
    pub source: PathBuf,
    pub volume: f32,
    pub fade_in: usize,
    pub fade_out: usize,
    pub offset: usize,
    pub length: usize,
    pub looped: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StingerRequest {
    pub path: PathBuf,
    /// Use at most this many seconds of the file.
    pub max_duration: Option<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BackgroundMusicRequest {
    pub path: PathBuf,
    pub volume: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TimelineRequest {
    pub main: PathBuf,
    /// Linear gain on top of loudness normalization (1.0 = 100%).
    pub main_volume: f32,
    pub intro: Option<StingerRequest>,
    pub outro: Option<StingerRequest>,
    pub bg_music: Option<BackgroundMusicRequest>,
    /// Seconds the main track waits at least, e.g. behind a title card.
    pub pre_roll: f64,
}

#[cfg(test)]
impl TimelineRequest {
    pub fn main_only(main: impl Into<PathBuf>) -> Self {
        Self {
            main: main.into(),
            main_volume: 1.0,
            intro: None,
            outro: None,
            bg_music: None,
            pre_roll: 0.0,
        }
    }
}

pub fn to_samples(seconds: f64, sample_rate: u32) -> usize {
    (seconds.max(0.0) * sample_rate as f64).round() as usize
}

#[derive(Clone, Debug, PartialEq)]
pub struct TimelinePlan {
    pub clips: Vec<AudioClipSpec>,
    pub sample_rate: u32,
    /// Where the main track starts (the lead).
    pub main_offset: usize,
    pub main_length: usize,
    pub length: usize,
}

impl TimelinePlan {
    pub fn lead(&self) -> usize {
        self.main_offset
    }

    pub fn trail(&self) -> usize {
        self.length - self.main_offset - self.main_length
    }

    pub fn seconds(&self, samples: usize) -> f64 {
        samples as f64 / self.sample_rate as f64
    }
}

/// Place every requested source given the (trimmed) clip lengths in samples.
///
/// The intro's last `min(3s, intro/2, main)` overlap the start of main; the
/// outro's first `min(10s, outro/2, main)` overlap its end. A pre-roll longer
/// than the intro's lead pushes main later and shortens the intro overlap.
pub fn plan(
    request: &TimelineRequest,
    sample_rate: u32,
    main_len: usize,
    intro_len: Option<usize>,
    outro_len: Option<usize>,
) -> TimelinePlan {
    let secs = |s: f64| to_samples(s, sample_rate);
    let mut clips = Vec::new();

    let stinger_lead = intro_len.map_or(0, |len| len - secs(INTRO_MAX_OVERLAP).min(len / 2).min(main_len));
    let lead = stinger_lead.max(secs(request.pre_roll));

    if let (Some(req), Some(len)) = (&request.intro, intro_len) {
        let overlap = len.saturating_sub(lead);
        clips.push(AudioClipSpec {
            role: ClipRole::Intro,
            source: req.path.clone(),
            volume: STINGER_LEVEL,
            fade_in: secs(STINGER_EDGE_FADE).min(lead.min(len)),
            fade_out: if overlap > 0 { overlap } else { secs(STINGER_EDGE_FADE).min(len) },
            offset: 0,
            length: len,
            looped: false,
        });
    }

    clips.push(AudioClipSpec {
        role: ClipRole::Main,
        source: request.main.clone(),
        volume: request.main_volume,
        fade_in: if intro_len.is_some() {
            secs(MAIN_FADE_IN_WITH_INTRO).min(main_len)
        } else {
            0
        },
        fade_out: 0,
        offset: lead,
        length: main_len,
        looped: false,
    });

    let mut trail = 0;
    if let (Some(req), Some(len)) = (&request.outro, outro_len) {
        let overlap = secs(OUTRO_MAX_OVERLAP).min(len / 2).min(main_len);
        trail = len - overlap;
        clips.push(AudioClipSpec {
            role: ClipRole::Outro,
            source: req.path.clone(),
            volume: STINGER_LEVEL,
            fade_in: overlap,
            fade_out: secs(STINGER_EDGE_FADE).min(trail),
            offset: lead + main_len - overlap,
            length: len,
            looped: false,
        });
    }

    let length = lead + main_len + trail;

    if let Some(bg) = &request.bg_music {
        clips.push(AudioClipSpec {
            role: ClipRole::BackgroundMusic,
            source: bg.path.clone(),
            volume: bg.volume,
            fade_in: secs(BG_MUSIC_EDGE_FADE).min(length / 2),
            fade_out: secs(BG_MUSIC_EDGE_FADE).min(length / 2),
            offset: 0,
            length,
            looped: true,
        });
    }

    TimelinePlan {
        clips,
        sample_rate,
        main_offset: lead,
        main_length: main_len,
        length,
    }
}

/// The flattened mix handed to the encoder.
#[derive(Clone, Debug)]
pub struct MixedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Sample where the main track starts.
    pub main_offset: usize,
}

impl MixedAudio {
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn lead_seconds(&self) -> f64 {
        self.main_offset as f64 / self.sample_rate as f64
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }

    pub fn write_wav(&self, path: &Path) -> RenderResult<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let to_io = |e: hound::Error| std::io::Error::other(format!("{}: {e}", path.display()));
        let mut writer = hound::WavWriter::create(path, spec).map_err(to_io)?;
        for &s in &self.samples {
            writer.write_sample(s).map_err(to_io)?;
        }
        writer.finalize().map_err(to_io)?;
        Ok(())
    }
}

struct LoadedClip {
    samples: Vec<f32>,
    gain: f32,
}

impl LoadedClip {
    fn load(path: &Path, sample_rate: u32, max_duration: Option<f32>) -> RenderResult<Self> {
        let audio = decode_audio(path)?;
        let mut samples = resample(&audio.samples, audio.sample_rate, sample_rate)?;
        if let Some(max) = max_duration {
            samples.truncate(to_samples(max as f64, sample_rate).max(1));
        }
        Ok(Self::from_samples(samples, sample_rate))
    }

    fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        let gain = normalization_gain(&samples, sample_rate, TARGET_LUFS);
        Self { samples, gain }
    }
}

/// Decode every requested source, normalize loudness, place and mix.
///
/// Any requested clip that fails to decode aborts the whole mix.
pub fn compose(request: &TimelineRequest, main: &AudioData) -> RenderResult<MixedAudio> {
    let sr = main.sample_rate;
    if sr == 0 || main.samples.is_empty() {
        return Err(RenderError::invalid_audio(&request.main, "zero-length audio"));
    }

    let main_clip = LoadedClip::from_samples(main.samples.clone(), sr);
    let intro = request
        .intro
        .as_ref()
        .map(|r| LoadedClip::load(&r.path, sr, r.max_duration))
        .transpose()?;
    let outro = request
        .outro
        .as_ref()
        .map(|r| LoadedClip::load(&r.path, sr, r.max_duration))
        .transpose()?;
    let bg_music = request
        .bg_music
        .as_ref()
        .map(|r| LoadedClip::load(&r.path, sr, None))
        .transpose()?;

    let timeline = plan(
        request,
        sr,
        main_clip.samples.len(),
        intro.as_ref().map(|c| c.samples.len()),
        outro.as_ref().map(|c| c.samples.len()),
    );

    let mut buffer = vec![0.0f32; timeline.length];

    for clip in &timeline.clips {
        let source = match clip.role {
            ClipRole::Main => Some(&main_clip),
            ClipRole::Intro => intro.as_ref(),
            ClipRole::Outro => outro.as_ref(),
            ClipRole::BackgroundMusic => bg_music.as_ref(),
        };
        if let Some(source) = source {
            log::debug!(
                "Mixing {:?} at {:.2}s for {:.2}s (gain {:.3})",
                clip.role,
                timeline.seconds(clip.offset),
                timeline.seconds(clip.length),
                source.gain * clip.volume
            );
            mix_clip(&mut buffer, clip, source);
        }
    }

    let mut limited = 0usize;
    for s in buffer.iter_mut() {
        if s.abs() > LIMITER_KNEE {
            limited += 1;
        }
        *s = soft_limit(*s);
    }

    let mix = MixedAudio {
        samples: buffer,
        sample_rate: sr,
        main_offset: timeline.main_offset,
    };
    log::info!(
        "Audio mix: {:.2}s (lead {:.2}s, main {:.2}s, trail {:.2}s), peak {:.3}, {} samples limited",
        mix.duration(),
        timeline.seconds(timeline.lead()),
        timeline.seconds(timeline.main_length),
        timeline.seconds(timeline.trail()),
        mix.peak(),
        limited
    );
    Ok(mix)
}

fn mix_clip(buffer: &mut [f32], clip: &AudioClipSpec, source: &LoadedClip) {
    let len = source.samples.len();
    if len == 0 {
        return;
    }
    let gain = clip.volume * source.gain;

    for k in 0..clip.length {
        let Some(out) = buffer.get_mut(clip.offset + k) else {
            break;
        };
        let src = if clip.looped { k % len } else { k };
        let Some(&sample) = source.samples.get(src) else {
            break;
        };
        *out += sample * gain * envelope(k, clip.length, clip.fade_in, clip.fade_out);
    }
}

/// Linear fade-in/fade-out gain at sample `k` of a clip `length` samples long.
pub fn envelope(k: usize, length: usize, fade_in: usize, fade_out: usize) -> f32 {
    let mut gain = 1.0;
    if fade_in > 0 && k < fade_in {
        gain *= k as f32 / fade_in as f32;
    }
    let remaining = length.saturating_sub(k);
    if fade_out > 0 && remaining < fade_out {
        gain *= remaining as f32 / fade_out as f32;
    }
    gain
}

/// Transparent below the knee, tanh-compressed towards [`MIX_CEILING`] above it.
pub fn soft_limit(sample: f32) -> f32 {
    let magnitude = sample.abs();
    if magnitude <= LIMITER_KNEE {
        return sample;
    }
    let headroom = MIX_CEILING - LIMITER_KNEE;
    let limited = LIMITER_KNEE + headroom * ((magnitude - LIMITER_KNEE) / headroom).tanh();
    limited.min(MIX_CEILING).copysign(sample)
}
