//! Intro title card shown before the visualization: centered, wrapped title
//! with an optional smaller subtitle underneath, animated in or static.

use image::RgbaImage;

use super::animation::{Animation, AnimationState};
use super::background::{cover_fit, load_image};
use super::overlay::Avatar;
use super::palette::Color;
use super::text::{wrap_text, TextOverlay};
use crate::config::TitleSpec;
use crate::error::RenderResult;

pub const DEFAULT_CARD_DURATION: f32 = 3.0;
/// The card dissolves into the visualization over its last half second.
pub const CARD_CROSSFADE: f32 = 0.5;

const MIN_TITLE_SIZE: f32 = 48.0;
const WRAP_FRACTION: f32 = 0.8;
const LINE_SPACING: f32 = 10.0;
const SUBTITLE_GAP: f32 = 60.0;
const SUBTITLE_SCALE: f32 = 0.5;
const SUBTITLE_DIM: f32 = 0.7;

/// Frames a card of `duration` seconds lasts.
pub fn card_frames(duration: f32, fps: u32) -> usize {
    (duration.max(0.0) as f64 * fps as f64).round().max(1.0) as usize
}

/// Title font size for a canvas width.
pub fn title_font_size(width: u32) -> f32 {
    (width as f32 / 15.0).floor().max(MIN_TITLE_SIZE)
}

pub struct TitleCard {
    background: RgbaImage,
    avatar: Option<Avatar>,
    font: TextOverlay,
    title: String,
    subtitle: Option<String>,
    color: Color,
    title_anim: Animation,
    subtitle_anim: Animation,
    fps: u32,
    frames: usize,
    /// Static cards render once.
    still: Option<RgbaImage>,
}

impl TitleCard {
    /// `fallback` is the main background, used when the card has none of
    /// its own. `font` sets the face; its size is replaced by the title size.
    pub fn new(spec: &TitleSpec, fallback: &RgbaImage, font: TextOverlay, fps: u32) -> RenderResult<Self> {
        let (width, height) = fallback.dimensions();
        let background = match &spec.background {
            Some(path) => cover_fit(&load_image(path)?, width, height),
            None => fallback.clone(),
        };
        let avatar = match &spec.avatar {
            Some(path) => Some(Avatar::load(path, (width.min(height) / 5).max(1))?),
            None => None,
        };
        let (title_anim, subtitle_anim) = if spec.static_card {
            (Animation::Still, Animation::Still)
        } else {
            spec.animation.build()
        };

        let mut card = Self {
            background,
            avatar,
            font: font.with_size(title_font_size(width)),
            title: spec.title.clone(),
            subtitle: spec.subtitle.clone().filter(|s| !s.trim().is_empty()),
            color: spec.color,
            title_anim,
            subtitle_anim,
            fps: fps.max(1),
            frames: card_frames(spec.duration, fps),
            still: None,
        };
        if spec.static_card {
            card.still = Some(card.draw(0.0));
        }
        log::info!(
            "Title card: {} frames, {}",
            card.frames,
            if spec.static_card {
                "static".to_string()
            } else {
                format!("{} animation", spec.animation)
            }
        );
        Ok(card)
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    /// Frames at the end of the card that blend into the visualization.
    pub fn crossfade_frames(&self) -> usize {
        card_frames(CARD_CROSSFADE, self.fps).min(self.frames)
    }

    pub fn render(&self, index: usize) -> RgbaImage {
        match &self.still {
            Some(image) => image.clone(),
            None => self.draw(index as f32 / self.fps as f32),
        }
    }

    fn draw(&self, t: f32) -> RgbaImage {
        let mut canvas = self.background.clone();
        let (width, height) = canvas.dimensions();
        if let Some(avatar) = &self.avatar {
            avatar.paste_at(&mut canvas, width as i64 / 2, height as i64 / 4);
        }

        let title_state = self.title_anim.state_at(t);
        let subtitle_state = self.subtitle_anim.state_at(t);

        // Layout uses the unscaled fonts so animated text grows around a fixed spot.
        let base = &self.font;
        let sub_base = base.with_size(base.font_size() * SUBTITLE_SCALE);
        let max_width = (width as f32 * WRAP_FRACTION) as u32;
        let lines = wrap_text(&self.title, max_width, |s| base.measure_width(s));
        let line_height = base.line_height();

        let title_height = line_height * lines.len() as f32 + LINE_SPACING * lines.len().saturating_sub(1) as f32;
        let total_height = match &self.subtitle {
            Some(_) => title_height + SUBTITLE_GAP + sub_base.line_height(),
            None => title_height,
        };
        let top = (height as f32 - total_height) / 2.0;

        let (shadow, shadow_alpha) = if self.color.luminance() > 0.5 {
            (Color::rgb(0, 0, 0), 180.0 / 255.0)
        } else {
            (Color::WHITE, 120.0 / 255.0)
        };

        let title_font = base.with_size(base.font_size() * title_state.scale);
        let mut reveal_left = title_state.visible_chars(lines.iter().map(|l| l.chars().count()).sum());
        let mut y = top;
        for line in &lines {
            let shown: String = line.chars().take(reveal_left).collect();
            reveal_left = reveal_left.saturating_sub(line.chars().count());
            let text = Text {
                full: line,
                shown: &shown,
                font: &title_font,
                base,
            };
            text.draw(&mut canvas, y, &title_state, self.color, 1.0, (shadow, shadow_alpha, 2));
            y += line_height + LINE_SPACING;
        }

        if let Some(subtitle) = &self.subtitle {
            let sub_font = sub_base.with_size(sub_base.font_size() * subtitle_state.scale);
            let text = Text {
                full: subtitle,
                shown: subtitle,
                font: &sub_font,
                base: &sub_base,
            };
            let y = top + title_height + SUBTITLE_GAP;
            text.draw(
                &mut canvas,
                y,
                &subtitle_state,
                self.color.scale(SUBTITLE_DIM),
                SUBTITLE_DIM,
                (shadow, shadow_alpha, 1),
            );
        }
        canvas
    }
}

/// One centered line. `shown` is the revealed prefix of `full`.
struct Text<'a> {
    full: &'a str,
    shown: &'a str,
    font: &'a TextOverlay,
    base: &'a TextOverlay,
}

impl Text<'_> {
    fn draw(
        &self,
        canvas: &mut RgbaImage,
        y: f32,
        state: &AnimationState,
        color: Color,
        alpha: f32,
        (shadow, shadow_alpha, shadow_offset): (Color, f32, i64),
    ) {
        let opacity = state.opacity.clamp(0.0, 1.0);
        if opacity <= 0.0 || self.shown.is_empty() {
            return;
        }
        let width = canvas.width() as f32;
        let base_width = self.base.measure_width(self.full) as f32;
        let scaled_width = self.font.measure_width(self.full) as f32;
        let x = (width - base_width) / 2.0 - (scaled_width - base_width) / 2.0 + state.offset_x;
        let y = y - (self.font.line_height() - self.base.line_height()) / 2.0 + state.offset_y;
        let (x, y) = (x.round() as i64, y.round() as i64);

        self.font.composite(
            canvas,
            self.shown,
            x + shadow_offset,
            y + shadow_offset,
            shadow,
            shadow_alpha * opacity,
        );
        self.font.composite(canvas, self.shown, x, y, color, alpha * opacity);
    }
}

/// Per-pixel mix of two equally sized frames, `t = 0` is all `from`.
pub fn crossfade(from: &RgbaImage, to: &RgbaImage, t: f32) -> RgbaImage {
    let t = t.clamp(0.0, 1.0);
    let mut out = from.clone();
    for (o, p) in out.pixels_mut().zip(to.pixels()) {
        for c in 0..4 {
            o[c] = (o[c] as f32 + (p[c] as f32 - o[c] as f32) * t).round() as u8;
        }
    }
    out
}
