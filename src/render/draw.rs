//! Anti-aliased primitives on an RGBA canvas. Coverage is computed analytically
//! per pixel, so output only depends on the inputs.

use image::RgbaImage;

use super::palette::Color;

/// Source-over blend of `color` with the given opacity into one pixel.
/// Out-of-bounds coordinates are ignored.
pub fn blend_pixel(canvas: &mut RgbaImage, x: i64, y: i64, color: Color, alpha: f32) {
    let (w, h) = canvas.dimensions();
    if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
        return;
    }
    let a = alpha.clamp(0.0, 1.0);
    if a <= 0.0 {
        return;
    }
    let p = canvas.get_pixel_mut(x as u32, y as u32);
    let inv = 1.0 - a;
    p[0] = (color.r as f32 * a + p[0] as f32 * inv).round() as u8;
    p[1] = (color.g as f32 * a + p[1] as f32 * inv).round() as u8;
    p[2] = (color.b as f32 * a + p[2] as f32 * inv).round() as u8;
    p[3] = ((a + p[3] as f32 / 255.0 * inv) * 255.0).round().min(255.0) as u8;
}

fn clip_range(lo: f32, hi: f32, limit: u32) -> std::ops::Range<i64> {
    let start = (lo.floor() as i64).max(0);
    let end = (hi.ceil() as i64).min(limit as i64);
    start..end.max(start)
}

/// Axis-aligned rectangle `[x0, x1) x [y0, y1)` with fractional edge coverage.
pub fn fill_rect(canvas: &mut RgbaImage, x0: f32, y0: f32, x1: f32, y1: f32, color: Color, alpha: f32) {
    let (left, right) = (x0.min(x1), x0.max(x1));
    let (top, bottom) = (y0.min(y1), y0.max(y1));
    let (w, h) = canvas.dimensions();

    for py in clip_range(top, bottom, h) {
        let cy = (bottom.min(py as f32 + 1.0) - top.max(py as f32)).clamp(0.0, 1.0);
        if cy <= 0.0 {
            continue;
        }
        for px in clip_range(left, right, w) {
            let cx = (right.min(px as f32 + 1.0) - left.max(px as f32)).clamp(0.0, 1.0);
            blend_pixel(canvas, px, py, color, alpha * cx * cy);
        }
    }
}

pub fn fill_circle(canvas: &mut RgbaImage, cx: f32, cy: f32, radius: f32, color: Color, alpha: f32) {
    if radius <= 0.0 {
        return;
    }
    let (w, h) = canvas.dimensions();
    for py in clip_range(cy - radius - 1.0, cy + radius + 1.0, h) {
        for px in clip_range(cx - radius - 1.0, cx + radius + 1.0, w) {
            let d = ((px as f32 + 0.5 - cx).powi(2) + (py as f32 + 0.5 - cy).powi(2)).sqrt();
            let coverage = (radius + 0.5 - d).clamp(0.0, 1.0);
            if coverage > 0.0 {
                blend_pixel(canvas, px, py, color, alpha * coverage);
            }
        }
    }
}

pub fn stroke_circle(
    canvas: &mut RgbaImage,
    cx: f32,
    cy: f32,
    radius: f32,
    width: f32,
    color: Color,
    alpha: f32,
) {
    let half = width / 2.0;
    let reach = radius + half + 1.0;
    let (w, h) = canvas.dimensions();
    for py in clip_range(cy - reach, cy + reach, h) {
        for px in clip_range(cx - reach, cx + reach, w) {
            let d = ((px as f32 + 0.5 - cx).powi(2) + (py as f32 + 0.5 - cy).powi(2)).sqrt();
            let coverage = (half + 0.5 - (d - radius).abs()).clamp(0.0, 1.0);
            if coverage > 0.0 {
                blend_pixel(canvas, px, py, color, alpha * coverage);
            }
        }
    }
}

fn distance_to_segment(px: f32, py: f32, a: (f32, f32), b: (f32, f32)) -> f32 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((px - a.0) * dx + (py - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (nx, ny) = (a.0 + t * dx, a.1 + t * dy);
    ((px - nx).powi(2) + (py - ny).powi(2)).sqrt()
}

/// Thick line segment with round caps.
pub fn draw_line(
    canvas: &mut RgbaImage,
    from: (f32, f32),
    to: (f32, f32),
    width: f32,
    color: Color,
    alpha: f32,
) {
    let half = width / 2.0;
    let (w, h) = canvas.dimensions();
    let ys = clip_range(from.1.min(to.1) - half - 1.0, from.1.max(to.1) + half + 1.0, h);
    let xs = clip_range(from.0.min(to.0) - half - 1.0, from.0.max(to.0) + half + 1.0, w);
    for py in ys {
        for px in xs.clone() {
            let d = distance_to_segment(px as f32 + 0.5, py as f32 + 0.5, from, to);
            let coverage = (half + 0.5 - d).clamp(0.0, 1.0);
            if coverage > 0.0 {
                blend_pixel(canvas, px, py, color, alpha * coverage);
            }
        }
    }
}

pub fn draw_polyline(canvas: &mut RgbaImage, points: &[(f32, f32)], width: f32, color: Color) {
    for pair in points.windows(2) {
        draw_line(canvas, pair[0], pair[1], width, color, 1.0);
    }
}
