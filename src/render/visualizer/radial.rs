use std::f32::consts::{FRAC_PI_2, TAU};

use image::RgbaImage;

use super::{band_tint, StyleContext};
use crate::audio::features::AudioFeatureFrame;
use crate::render::draw::{draw_line, stroke_circle};

const AVATAR_GAP: f32 = 10.0;

pub fn draw(canvas: &mut RgbaImage, frame: &AudioFeatureFrame, ctx: &StyleContext) {
    let (cx, cy) = ctx.center();
    let base_radius = match ctx.avatar_radius {
        Some(r) => r + AVATAR_GAP,
        None => ctx.min_side() * 0.15,
    };
    let max_bar = ctx.min_side() * 0.3;
    let gain = 0.5 + frame.amplitude * 0.5;
    let width = ctx.stroke(3.0);

    let n = frame.bands.len();
    for (i, &val) in frame.bands.iter().enumerate() {
        // First bar points straight up.
        let angle = TAU * i as f32 / n as f32 - FRAC_PI_2;
        let length = val * max_bar * gain;
        if length <= 0.0 {
            continue;
        }
        let (sin, cos) = angle.sin_cos();
        let from = (cx + cos * base_radius, cy + sin * base_radius);
        let to = (cx + cos * (base_radius + length), cy + sin * (base_radius + length));
        draw_line(canvas, from, to, width, band_tint(ctx.color, i as f32 / n as f32), 1.0);
    }

    if ctx.avatar_radius.is_none() {
        let ring = base_radius * (0.8 + frame.amplitude * 0.2);
        stroke_circle(canvas, cx, cy, ring, ctx.stroke(2.0), ctx.color, 1.0);
    }
}
