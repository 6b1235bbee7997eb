//! Visualization styles. Each style draws one feature row onto a canvas that
//! already holds the background; only `particles` carries state between
//! frames, and that state is passed explicitly.

mod bars;
pub mod particles;
mod radial;
mod spectrum;
mod waveform;

use std::fmt;

use image::RgbaImage;
use serde::Deserialize;

pub use particles::ParticleState;

use super::palette::Color;
use crate::audio::features::AudioFeatureFrame;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    #[default]
    Waveform,
    Radial,
    Bars,
    Spectrum,
    Particles,
}

impl Style {
    /// Whether frames depend on earlier frames and must be drawn in order.
    pub fn is_stateful(self) -> bool {
        matches!(self, Style::Particles)
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Style::Waveform => "waveform",
            Style::Radial => "radial",
            Style::Bars => "bars",
            Style::Spectrum => "spectrum",
            Style::Particles => "particles",
        };
        f.write_str(name)
    }
}

/// Per-render constants every style needs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StyleContext {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub color: Color,
    /// Radius of the pasted avatar, if any.
    pub avatar_radius: Option<f32>,
}

impl StyleContext {
    pub fn center(&self) -> (f32, f32) {
        (self.width as f32 / 2.0, self.height as f32 / 2.0)
    }

    pub fn min_side(&self) -> f32 {
        self.width.min(self.height) as f32
    }

    /// Stroke width scaled from a 1080p reference.
    pub fn stroke(&self, reference: f32) -> f32 {
        (reference * self.min_side() / 1080.0).max(1.0)
    }
}

/// Draw `frame` in `style`. The particle style draws `particles`, which the
/// caller advances once per frame with [`particles::advance`].
pub fn render(
    style: Style,
    canvas: &mut RgbaImage,
    frame: &AudioFeatureFrame,
    ctx: &StyleContext,
    particles: Option<&ParticleState>,
) {
    match style {
        Style::Waveform => waveform::draw(canvas, frame, ctx),
        Style::Radial => radial::draw(canvas, frame, ctx),
        Style::Bars => bars::draw(canvas, frame, ctx),
        Style::Spectrum => spectrum::draw(canvas, frame, ctx),
        Style::Particles => {
            if let Some(state) = particles {
                particles::draw(canvas, state, frame, ctx);
            }
        }
    }
}

/// Tint shift across the band index used by several styles.
fn band_tint(color: Color, ratio: f32) -> Color {
    let c = |v: u8, f: f32| (v as f32 * f).round().clamp(0.0, 255.0) as u8;
    Color::rgb(
        c(color.r, 1.0 - ratio * 0.3),
        c(color.g, 0.7 + ratio * 0.3),
        c(color.b, 0.7 + ratio * 0.3),
    )
}
