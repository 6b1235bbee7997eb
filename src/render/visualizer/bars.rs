use image::RgbaImage;

use super::StyleContext;
use crate::audio::features::AudioFeatureFrame;
use crate::render::draw::fill_rect;

/// Equalizer bars driven by the held bands, so each bar rises with the
/// signal and falls back slowly. A dim reflection sits under the baseline.
pub fn draw(canvas: &mut RgbaImage, frame: &AudioFeatureFrame, ctx: &StyleContext) {
    let n = frame.held_bands.len();
    if n == 0 {
        return;
    }
    let w = ctx.width as f32;
    let h = ctx.height as f32;
    let slot = w / n as f32;
    let bar_width = slot * 0.8;
    let gap = slot * 0.2;
    let max_height = h * 0.6;
    let base_y = h * 0.8;
    let gain = 0.5 + frame.envelope * 0.5;

    for (i, &val) in frame.held_bands.iter().enumerate() {
        let x = i as f32 * slot + gap / 2.0;
        let bar_height = val * max_height * gain;
        if bar_height <= 0.0 {
            continue;
        }
        let color = ctx.color.scale(0.5 + val * 0.5);

        fill_rect(canvas, x, base_y - bar_height, x + bar_width, base_y, color, 1.0);
        fill_rect(
            canvas,
            x,
            base_y,
            x + bar_width,
            base_y + bar_height * 0.3,
            color.scale(0.3),
            1.0,
        );
    }
}
