use image::RgbaImage;

use super::StyleContext;
use crate::audio::features::AudioFeatureFrame;
use crate::render::draw::{draw_polyline, fill_rect};

/// Center band whose thickness follows the smoothed envelope, with the
/// frame's waveform traced over it and mirrored below.
pub fn draw(canvas: &mut RgbaImage, frame: &AudioFeatureFrame, ctx: &StyleContext) {
    let w = ctx.width as f32;
    let h = ctx.height as f32;
    let center_y = h / 2.0;

    let half = h * (0.005 + 0.15 * frame.envelope);
    fill_rect(canvas, 0.0, center_y - half, w, center_y + half, ctx.color, 0.25);

    let n = frame.waveform.len();
    if n < 2 {
        return;
    }
    let scale = 0.3 + frame.envelope * 0.7;
    let max_height = h * 0.4;

    let points: Vec<(f32, f32)> = frame
        .waveform
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let x = i as f32 * w / (n - 1) as f32;
            (x, center_y + v * max_height * scale)
        })
        .collect();
    let mirror: Vec<(f32, f32)> = points.iter().map(|&(x, y)| (x, 2.0 * center_y - y)).collect();

    draw_polyline(canvas, &mirror, ctx.stroke(2.0), ctx.color.scale(0.5));
    draw_polyline(canvas, &points, ctx.stroke(3.0), ctx.color);
}
