use std::fmt;
use std::str::FromStr;

use image::{Rgba, RgbaImage};

use crate::error::{RenderError, RenderResult};

/// Subtitle text flips from white to near-black above this background luminance.
pub const SUBTITLE_LUMINANCE_THRESHOLD: f32 = 0.5;

const KMEANS_CLUSTERS: usize = 3;
const KMEANS_MAX_ITERATIONS: usize = 10;
const MAX_COLOR_SAMPLES: usize = 4096;
const MIN_WAVE_SATURATION: f32 = 0.7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const NEAR_BLACK: Color = Color::rgb(0x1a, 0x1a, 0x1a);
    pub const DEFAULT_BACKGROUND: Color = Color::rgb(0x1a, 0x1a, 0x2e);
    pub const DEFAULT_WAVE: Color = Color::rgb(0x00, 0xd4, 0xff);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_hex(s: &str) -> RenderResult<Self> {
        let hex = s.trim().trim_start_matches('#');
        let bad = || RenderError::config(format!("invalid color '{s}', expected #rrggbb"));
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return Err(bad()),
        };
        let channel = |i: usize| {
            expanded
                .get(i..i + 2)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(bad)
        };
        Ok(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Rec. 601 luma in 0.0-1.0.
    pub fn luminance(&self) -> f32 {
        (0.299 * self.r as f32 + 0.587 * self.g as f32 + 0.114 * self.b as f32) / 255.0
    }

    pub fn scale(&self, factor: f32) -> Self {
        let c = |v: u8| (v as f32 * factor).round().clamp(0.0, 255.0) as u8;
        Self::rgb(c(self.r), c(self.g), c(self.b))
    }

    pub fn lerp(a: Color, b: Color, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let c = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t).round() as u8;
        Self::rgb(c(a.r, b.r), c(a.g, b.g), c(a.b, b.b))
    }

    pub fn rgba(&self, alpha: u8) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, alpha])
    }

    /// Hue in degrees, saturation and value in 0.0-1.0.
    pub fn to_hsv(&self) -> (f32, f32, f32) {
        let r = self.r as f32 / 255.0;
        let g = self.g as f32 / 255.0;
        let b = self.b as f32 / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let hue = if delta == 0.0 {
            0.0
        } else if max == r {
            60.0 * ((g - b) / delta).rem_euclid(6.0)
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        let saturation = if max == 0.0 { 0.0 } else { delta / max };
        (hue, saturation, max)
    }

    pub fn from_hsv(hue: f32, saturation: f32, value: f32) -> Self {
        let s = saturation.clamp(0.0, 1.0);
        let v = value.clamp(0.0, 1.0);
        let h = hue.rem_euclid(360.0) / 60.0;
        let c = v * s;
        let x = c * (1.0 - (h.rem_euclid(2.0) - 1.0).abs());
        let m = v - c;
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let to_u8 = |f: f32| ((f + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Self::rgb(to_u8(r), to_u8(g), to_u8(b))
    }
}

impl From<Rgba<u8>> for Color {
    fn from(p: Rgba<u8>) -> Self {
        Self::rgb(p[0], p[1], p[2])
    }
}

impl FromStr for Color {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A color option that may be derived from the background.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColorChoice {
    Auto,
    Fixed(Color),
}

impl ColorChoice {
    pub fn resolve(self, derive: impl FnOnce() -> Color) -> Color {
        match self {
            ColorChoice::Auto => derive(),
            ColorChoice::Fixed(c) => c,
        }
    }
}

impl FromStr for ColorChoice {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(ColorChoice::Auto)
        } else {
            Color::from_hex(s).map(ColorChoice::Fixed)
        }
    }
}

/// Pixels of the given fractional region, subsampled on a regular grid.
fn sample_region(img: &RgbaImage, x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<Color> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let left = ((w as f32 * x0) as u32).min(w - 1);
    let top = ((h as f32 * y0) as u32).min(h - 1);
    let right = ((w as f32 * x1).ceil() as u32).clamp(left + 1, w);
    let bottom = ((h as f32 * y1).ceil() as u32).clamp(top + 1, h);

    let area = ((right - left) as usize) * ((bottom - top) as usize);
    let step = ((area as f32 / MAX_COLOR_SAMPLES as f32).sqrt().ceil() as u32).max(1);

    let mut samples = Vec::with_capacity(area.min(MAX_COLOR_SAMPLES * 2));
    for y in (top..bottom).step_by(step as usize) {
        for x in (left..right).step_by(step as usize) {
            samples.push(Color::from(*img.get_pixel(x, y)));
        }
    }
    samples
}

fn mean_luminance(samples: &[Color]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(Color::luminance).sum::<f32>() / samples.len() as f32
}

/// Deterministic k-means: seeds at luminance quantiles, fixed iteration cap.
fn kmeans(samples: &[Color]) -> Vec<Color> {
    let points: Vec<[f32; 3]> = samples
        .iter()
        .map(|c| [c.r as f32, c.g as f32, c.b as f32])
        .collect();

    let mut by_luminance: Vec<&Color> = samples.iter().collect();
    by_luminance.sort_by(|a, b| a.luminance().total_cmp(&b.luminance()));

    let n = samples.len();
    let mut centroids: Vec<[f32; 3]> = (0..KMEANS_CLUSTERS)
        .map(|k| {
            let q = (2 * k + 1) as f32 / (2 * KMEANS_CLUSTERS) as f32;
            let c = by_luminance[((n as f32 * q) as usize).min(n - 1)];
            [c.r as f32, c.g as f32, c.b as f32]
        })
        .collect();

    let mut assignment = vec![usize::MAX; n];
    for _ in 0..KMEANS_MAX_ITERATIONS {
        let mut changed = false;
        for (i, p) in points.iter().enumerate() {
            let mut best = 0;
            let mut best_dist = f32::INFINITY;
            for (k, c) in centroids.iter().enumerate() {
                let d = (p[0] - c[0]).powi(2) + (p[1] - c[1]).powi(2) + (p[2] - c[2]).powi(2);
                if d < best_dist {
                    best_dist = d;
                    best = k;
                }
            }
            if assignment[i] != best {
                assignment[i] = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![[0.0f64; 3]; KMEANS_CLUSTERS];
        let mut counts = vec![0usize; KMEANS_CLUSTERS];
        for (p, &k) in points.iter().zip(&assignment) {
            for ch in 0..3 {
                sums[k][ch] += p[ch] as f64;
            }
            counts[k] += 1;
        }
        for k in 0..KMEANS_CLUSTERS {
            // Empty clusters keep their previous centroid.
            if counts[k] > 0 {
                for ch in 0..3 {
                    centroids[k][ch] = (sums[k][ch] / counts[k] as f64) as f32;
                }
            }
        }
    }

    centroids
        .into_iter()
        .map(|c| {
            Color::rgb(
                c[0].round().clamp(0.0, 255.0) as u8,
                c[1].round().clamp(0.0, 255.0) as u8,
                c[2].round().clamp(0.0, 255.0) as u8,
            )
        })
        .collect()
}

/// Pick a visualization color that stands out against the center of the
/// background.
///
/// Centroids are scored by `|luminance - background luminance| + 0.5 * saturation`;
/// equal scores resolve to the first centroid in ascending
/// `(luminance, r, g, b)` order. The winner is pushed to at least 70%
/// saturation and brightened on dark backgrounds or darkened on light ones.
pub fn auto_wave_color(background: &RgbaImage) -> Color {
    let samples = sample_region(background, 0.3, 0.3, 0.7, 0.7);
    if samples.is_empty() {
        return Color::DEFAULT_WAVE;
    }
    let bg_luminance = mean_luminance(&samples);

    let mut centroids = kmeans(&samples);
    centroids.sort_by(|a, b| {
        a.luminance()
            .total_cmp(&b.luminance())
            .then(a.r.cmp(&b.r))
            .then(a.g.cmp(&b.g))
            .then(a.b.cmp(&b.b))
    });

    let score = |c: &Color| (c.luminance() - bg_luminance).abs() + 0.5 * c.to_hsv().1;
    let mut best = centroids[0];
    let mut best_score = score(&best);
    for c in centroids.iter().skip(1) {
        let s = score(c);
        if s > best_score {
            best = *c;
            best_score = s;
        }
    }

    let (hue, saturation, value) = best.to_hsv();
    let value = if bg_luminance < 0.5 {
        value.max(0.9)
    } else {
        value.min(0.45)
    };
    let color = Color::from_hsv(hue, saturation.max(MIN_WAVE_SATURATION), value);
    log::debug!(
        "Auto wave color {} (background luminance {:.3}, centroid {})",
        color,
        bg_luminance,
        best
    );
    color
}

/// White on dark lower thirds, near-black on light ones.
pub fn auto_subtitle_color(background: &RgbaImage) -> Color {
    let luminance = mean_luminance(&sample_region(background, 0.0, 0.8, 1.0, 1.0));
    if luminance < SUBTITLE_LUMINANCE_THRESHOLD {
        Color::WHITE
    } else {
        Color::NEAR_BLACK
    }
}
