//! Integrated loudness in the style of ITU-R BS.1770 (mono).
//!
//! K-weighting (high shelf + high pass) followed by 400ms gating blocks with
//! 75% overlap, an absolute gate at -70 LUFS and a relative gate 10 LU below
//! the ungated mean.

use std::f64::consts::PI;

pub const TARGET_LUFS: f32 = -16.0;
const MAX_GAIN_DB: f32 = 20.0;
const ABSOLUTE_GATE_LUFS: f64 = -70.0;
const RELATIVE_GATE_LU: f64 = -10.0;
const BLOCK_SECONDS: f64 = 0.4;
const BLOCK_OVERLAP: f64 = 0.75;

#[derive(Clone, Copy, Debug)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    fn high_shelf(sample_rate: f64) -> Self {
        let gain_db = 3.999_843_853_973_347;
        let q = 0.707_175_236_955_419_6;
        let fc = 1_681.974_450_955_533;

        let a = 10f64.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * fc / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q);
        let sqrt_a = a.sqrt();

        let a0 = (a + 1.0) - (a - 1.0) * cos + 2.0 * sqrt_a * alpha;
        Self {
            b0: a * ((a + 1.0) + (a - 1.0) * cos + 2.0 * sqrt_a * alpha) / a0,
            b1: -2.0 * a * ((a - 1.0) + (a + 1.0) * cos) / a0,
            b2: a * ((a + 1.0) + (a - 1.0) * cos - 2.0 * sqrt_a * alpha) / a0,
            a1: 2.0 * ((a - 1.0) - (a + 1.0) * cos) / a0,
            a2: ((a + 1.0) - (a - 1.0) * cos - 2.0 * sqrt_a * alpha) / a0,
        }
    }

    fn high_pass(sample_rate: f64) -> Self {
        let q = 0.500_327_037_323_877_3;
        let fc = 38.135_470_876_024_44;

        let w0 = 2.0 * PI * fc / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q);

        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 + cos) / 2.0 / a0,
            b1: -(1.0 + cos) / a0,
            b2: (1.0 + cos) / 2.0 / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn apply(&self, input: &[f64]) -> Vec<f64> {
        let (mut x1, mut x2, mut y1, mut y2) = (0.0, 0.0, 0.0, 0.0);
        input
            .iter()
            .map(|&x| {
                let y = self.b0 * x + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
                x2 = x1;
                x1 = x;
                y2 = y1;
                y1 = y;
                y
            })
            .collect()
    }
}

/// Integrated loudness in LUFS, or `None` when everything is gated out
/// (silence or a clip shorter than one block).
pub fn integrated_loudness(samples: &[f32], sample_rate: u32) -> Option<f32> {
    if sample_rate == 0 {
        return None;
    }
    let sr = sample_rate as f64;
    let block = (BLOCK_SECONDS * sr).round() as usize;
    let hop = ((1.0 - BLOCK_OVERLAP) * BLOCK_SECONDS * sr).round().max(1.0) as usize;
    if block == 0 || samples.len() < block {
        return None;
    }

    let input: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
    let weighted = Biquad::high_pass(sr).apply(&Biquad::high_shelf(sr).apply(&input));

    let block_power: Vec<f64> = (0..=(weighted.len() - block) / hop)
        .map(|b| {
            let start = b * hop;
            weighted[start..start + block].iter().map(|v| v * v).sum::<f64>() / block as f64
        })
        .collect();

    let loudness = |power: f64| -0.691 + 10.0 * power.log10();

    let above_absolute: Vec<f64> = block_power
        .into_iter()
        .filter(|&p| p > 0.0 && loudness(p) > ABSOLUTE_GATE_LUFS)
        .collect();
    if above_absolute.is_empty() {
        return None;
    }

    let ungated = above_absolute.iter().sum::<f64>() / above_absolute.len() as f64;
    let relative_gate = loudness(ungated) + RELATIVE_GATE_LU;

    let gated: Vec<f64> = above_absolute
        .into_iter()
        .filter(|&p| loudness(p) > relative_gate)
        .collect();
    if gated.is_empty() {
        return None;
    }

    let mean = gated.iter().sum::<f64>() / gated.len() as f64;
    Some(loudness(mean) as f32)
}

/// Linear gain that brings `samples` to `target_lufs`, capped at +20 dB.
/// Silence and too-short clips get unity gain.
pub fn normalization_gain(samples: &[f32], sample_rate: u32, target_lufs: f32) -> f32 {
    match integrated_loudness(samples, sample_rate) {
        Some(measured) => {
            let gain_db = (target_lufs - measured).min(MAX_GAIN_DB);
            10f32.powf(gain_db / 20.0)
        }
        None => 1.0,
    }
}
