use image::RgbaImage;

use super::{band_tint, StyleContext};
use crate::audio::features::AudioFeatureFrame;
use crate::render::draw::{draw_polyline, fill_rect};
use crate::render::palette::Color;

const OUTLINE_STEP: usize = 4;

/// Linear interpolation across bands at fractional position `pos`.
fn sample(values: &[f32], pos: f32) -> f32 {
    let last = values.len().saturating_sub(1);
    let i = (pos.floor() as usize).min(last);
    let j = (i + 1).min(last);
    let t = pos - i as f32;
    values[i] + (values[j] - values[i]) * t
}

/// Filled curve across all bands with a brighter outline and a white
/// peak-hold line.
pub fn draw(canvas: &mut RgbaImage, frame: &AudioFeatureFrame, ctx: &StyleContext) {
    let n = frame.bands.len();
    if n == 0 || ctx.width == 0 {
        return;
    }
    let w = ctx.width as usize;
    let h = ctx.height as f32;
    let max_height = h * 0.7;
    let base_y = h * 0.85;
    let gain = 0.6 + frame.amplitude * 0.4;
    let span = (w.max(2) - 1) as f32;

    let mut outline = Vec::with_capacity(w / OUTLINE_STEP + 2);
    let mut peaks = Vec::with_capacity(w / OUTLINE_STEP + 2);

    for x in 0..w {
        let pos = x as f32 / span * (n - 1) as f32;
        let height = sample(&frame.bands, pos) * gain * max_height;
        let top = base_y - height;
        let ratio = x as f32 / span;
        let color = band_tint(ctx.color, ratio);

        if height > 0.0 {
            let xf = x as f32;
            fill_rect(canvas, xf, top, xf + 1.0, base_y, color, 0.85);
            fill_rect(canvas, xf, base_y, xf + 1.0, base_y + height * 0.2, color.scale(0.15), 1.0);
        }

        if x % OUTLINE_STEP == 0 || x == w - 1 {
            outline.push((x as f32 + 0.5, top));
            let held = sample(&frame.held_bands, pos).min(1.0) * max_height;
            peaks.push((x as f32 + 0.5, base_y - held));
        }
    }

    if frame.amplitude > 0.0 {
        draw_polyline(canvas, &outline, ctx.stroke(2.0), Color::lerp(ctx.color, Color::WHITE, 0.3));
    }
    if frame.held_bands.iter().any(|&v| v > 0.0) {
        draw_polyline(canvas, &peaks, ctx.stroke(1.5), Color::WHITE);
    }
}
