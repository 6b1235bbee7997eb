//! Time-based animation of title card elements: easing curves, per-element
//! state and small compositions (delay, parallel) built from a few tweens.

use std::fmt;

use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ease {
    Linear,
    OutQuad,
    OutCubic,
    /// Overshoots slightly past 1.0 before settling.
    OutBack,
}

impl Ease {
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::OutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            Self::OutCubic => 1.0 - (1.0 - t).powi(3),
            Self::OutBack => {
                const C1: f32 = 1.70158;
                const C3: f32 = C1 + 1.0;
                1.0 + C3 * (t - 1.0).powi(3) + C1 * (t - 1.0).powi(2)
            }
        }
    }
}

/// How one element is drawn at a point in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimationState {
    pub opacity: f32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    /// Fraction of the text's characters shown.
    pub reveal: f32,
}

impl Default for AnimationState {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            reveal: 1.0,
        }
    }
}

impl AnimationState {
    /// Multiplies opacity and scale, adds offsets, keeps the smaller reveal.
    pub fn merge(self, other: Self) -> Self {
        Self {
            opacity: self.opacity * other.opacity,
            scale: self.scale * other.scale,
            offset_x: self.offset_x + other.offset_x,
            offset_y: self.offset_y + other.offset_y,
            reveal: self.reveal.min(other.reveal),
        }
    }

    pub fn visible_chars(&self, total: usize) -> usize {
        ((total as f32 * self.reveal.clamp(0.0, 1.0)).floor() as usize).min(total)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tween {
    Fade { from: f32, to: f32 },
    Scale { from: f32, to: f32 },
    /// Starts displaced by `(dx, dy)` pixels and ends in place.
    Slide { dx: f32, dy: f32 },
    Reveal,
}

impl Tween {
    fn at(self, p: f32) -> AnimationState {
        let lerp = |a: f32, b: f32| a + (b - a) * p;
        match self {
            Tween::Fade { from, to } => AnimationState {
                opacity: lerp(from, to),
                ..Default::default()
            },
            Tween::Scale { from, to } => AnimationState {
                scale: lerp(from, to),
                ..Default::default()
            },
            Tween::Slide { dx, dy } => AnimationState {
                offset_x: dx * (1.0 - p),
                offset_y: dy * (1.0 - p),
                ..Default::default()
            },
            Tween::Reveal => AnimationState {
                reveal: p,
                ..Default::default()
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Animation {
    Still,
    Tween {
        tween: Tween,
        duration: f32,
        ease: Ease,
    },
    Delay {
        by: f32,
        inner: Box<Animation>,
    },
    Parallel(Vec<Animation>),
}

pub const SLIDE_DISTANCE: f32 = 50.0;

pub fn fade_in(duration: f32, ease: Ease) -> Animation {
    Animation::Tween {
        tween: Tween::Fade { from: 0.0, to: 1.0 },
        duration,
        ease,
    }
}

pub fn scale(from: f32, duration: f32, ease: Ease) -> Animation {
    Animation::Tween {
        tween: Tween::Scale { from, to: 1.0 },
        duration,
        ease,
    }
}

pub fn slide_up(duration: f32) -> Animation {
    Animation::Tween {
        tween: Tween::Slide {
            dx: 0.0,
            dy: SLIDE_DISTANCE,
        },
        duration,
        ease: Ease::OutCubic,
    }
}

pub fn typewriter(duration: f32) -> Animation {
    Animation::Tween {
        tween: Tween::Reveal,
        duration,
        ease: Ease::Linear,
    }
}

impl Animation {
    pub fn delay(self, by: f32) -> Animation {
        Animation::Delay {
            by,
            inner: Box::new(self),
        }
    }

    /// Seconds until the end state is reached.
    pub fn duration(&self) -> f32 {
        match self {
            Animation::Still => 0.0,
            Animation::Tween { duration, .. } => duration.max(0.0),
            Animation::Delay { by, inner } => by.max(0.0) + inner.duration(),
            Animation::Parallel(children) => children.iter().map(Animation::duration).fold(0.0, f32::max),
        }
    }

    /// State at `t` seconds. Before the start the first state holds, after
    /// the end the last.
    pub fn state_at(&self, t: f32) -> AnimationState {
        match self {
            Animation::Still => AnimationState::default(),
            Animation::Tween { tween, duration, ease } => {
                let progress = if *duration <= 0.0 { 1.0 } else { t / duration };
                tween.at(ease.apply(progress))
            }
            Animation::Delay { by, inner } => inner.state_at(t - by),
            Animation::Parallel(children) => children
                .iter()
                .fold(AnimationState::default(), |state, child| state.merge(child.state_at(t))),
        }
    }
}

/// Entrance of the title card text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TitleAnimation {
    /// Fade in while settling from slightly enlarged.
    #[default]
    Settle,
    FadeIn,
    ScaleUp,
    SlideUp,
    Typewriter,
}

impl fmt::Display for TitleAnimation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TitleAnimation::Settle => "settle",
            TitleAnimation::FadeIn => "fade-in",
            TitleAnimation::ScaleUp => "scale-up",
            TitleAnimation::SlideUp => "slide-up",
            TitleAnimation::Typewriter => "typewriter",
        };
        f.write_str(name)
    }
}

const TITLE_DURATION: f32 = 1.0;
const SUBTITLE_DURATION: f32 = 0.5;
const SUBTITLE_GAP: f32 = 0.3;

impl TitleAnimation {
    /// Title and subtitle animations. The subtitle follows once the title
    /// has landed.
    pub fn build(self) -> (Animation, Animation) {
        let title = match self {
            TitleAnimation::Settle => Animation::Parallel(vec![
                fade_in(TITLE_DURATION, Ease::OutQuad),
                scale(1.15, TITLE_DURATION, Ease::OutCubic),
            ]),
            TitleAnimation::FadeIn => fade_in(TITLE_DURATION, Ease::OutQuad),
            TitleAnimation::ScaleUp => Animation::Parallel(vec![
                fade_in(TITLE_DURATION * 0.5, Ease::OutQuad),
                scale(0.8, TITLE_DURATION, Ease::OutBack),
            ]),
            TitleAnimation::SlideUp => Animation::Parallel(vec![
                fade_in(TITLE_DURATION, Ease::OutQuad),
                slide_up(TITLE_DURATION),
            ]),
            TitleAnimation::Typewriter => typewriter(TITLE_DURATION * 1.5),
        };
        let subtitle = match self {
            TitleAnimation::SlideUp => Animation::Parallel(vec![
                fade_in(SUBTITLE_DURATION, Ease::OutQuad),
                slide_up(SUBTITLE_DURATION),
            ]),
            _ => fade_in(SUBTITLE_DURATION, Ease::OutQuad),
        };
        let subtitle = subtitle.delay(title.duration() + SUBTITLE_GAP);
        (title, subtitle)
    }
}
