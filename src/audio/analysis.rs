use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use super::features::AudioFeatureFrame;
use crate::error::{RenderError, RenderResult};

pub const FFT_SIZE: usize = 2048;
pub const NUM_BANDS: usize = 64;
pub const WAVEFORM_POINTS: usize = 200;

const MIN_BAND_HZ: f32 = 30.0;
const MAX_BAND_HZ: f32 = 16_000.0;
const DYNAMIC_RANGE_DB: f32 = 60.0;
const POWER_FLOOR: f32 = 1e-12;
const ENVELOPE_RADIUS: usize = 2;
const RELEASE_PER_FRAME_AT_30FPS: f32 = 0.95;
const ONSET_WINDOW_SECONDS: f32 = 0.3;
const MIN_ONSET_GAP_SECONDS: f32 = 0.1;

struct RawFrame {
    rms: f32,
    band_power: Vec<f32>,
    waveform: Vec<f32>,
}

/// Number of video frames covering `duration` seconds at `fps`.
///
/// A tiny tolerance absorbs float noise so that e.g. 10.0s at 30fps is 300
/// frames, not 301.
pub fn frame_count(duration: f32, fps: u32) -> usize {
    let exact = duration as f64 * fps as f64;
    (exact - 1e-6).ceil().max(0.0) as usize
}

/// Build the per-frame feature table for a mono sample buffer.
///
/// Amplitude is the RMS of the window `[i/fps, (i+1)/fps)` divided by the
/// loudest window's RMS. Windows that run past the end of the buffer are
/// padded with silence.
pub fn extract(
    samples: &[f32],
    sample_rate: u32,
    fps: u32,
    total_duration: f32,
) -> RenderResult<Vec<AudioFeatureFrame>> {
    if fps == 0 {
        return Err(RenderError::config("fps must be greater than zero"));
    }
    if sample_rate == 0 || samples.is_empty() || !(total_duration > 0.0) {
        return Err(RenderError::InvalidAudio {
            origin: "audio buffer".into(),
            reason: format!(
                "nothing to analyse ({} samples, {}Hz, {:.3}s)",
                samples.len(),
                sample_rate,
                total_duration
            ),
        });
    }

    let total_frames = frame_count(total_duration, fps);
    log::info!("Per-frame analysis: {} frames at {}fps", total_frames, fps);

    let raw = analyse_windows(samples, sample_rate, fps, total_frames);
    Ok(finalize(raw, fps))
}

fn analyse_windows(samples: &[f32], sample_rate: u32, fps: u32, total_frames: usize) -> Vec<RawFrame> {
    let samples_per_frame = sample_rate as f64 / fps as f64;
    let hann = hann_window(FFT_SIZE);
    let bins = band_bins(sample_rate);

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FFT_SIZE);

    let sample_at = |idx: i64| -> f32 {
        if idx < 0 {
            0.0
        } else {
            samples.get(idx as usize).copied().unwrap_or(0.0)
        }
    };

    (0..total_frames)
        .into_par_iter()
        .map(|frame_idx| {
            let start = (frame_idx as f64 * samples_per_frame).floor() as i64;
            let end = ((frame_idx + 1) as f64 * samples_per_frame).floor() as i64;
            let window_len = (end - start).max(1);

            let sum_sq: f32 = (start..end).map(|i| sample_at(i).powi(2)).sum();
            let rms = (sum_sq / window_len as f32).sqrt();

            let waveform: Vec<f32> = (0..WAVEFORM_POINTS)
                .map(|k| sample_at(start + (k as i64 * window_len) / WAVEFORM_POINTS as i64))
                .collect();

            let center = (start + end) / 2;
            let fft_start = center - (FFT_SIZE / 2) as i64;
            let mut buffer: Vec<Complex<f32>> = (0..FFT_SIZE)
                .map(|k| Complex::new(sample_at(fft_start + k as i64) * hann[k], 0.0))
                .collect();
            fft.process(&mut buffer);

            let band_power = bins
                .iter()
                .map(|&(lo, hi)| {
                    let sum: f32 = buffer[lo..hi].iter().map(|c| c.norm_sqr()).sum();
                    sum / (hi - lo) as f32
                })
                .collect();

            RawFrame {
                rms,
                band_power,
                waveform,
            }
        })
        .collect()
}

fn finalize(raw: Vec<RawFrame>, fps: u32) -> Vec<AudioFeatureFrame> {
    let n = raw.len();
    if n == 0 {
        return Vec::new();
    }

    let peak_rms = raw.iter().map(|f| f.rms).fold(0.0f32, f32::max);
    let peak_power = raw
        .iter()
        .flat_map(|f| f.band_power.iter().copied())
        .fold(0.0f32, f32::max);

    let amplitudes: Vec<f32> = raw
        .iter()
        .map(|f| if peak_rms > 1e-9 { (f.rms / peak_rms).min(1.0) } else { 0.0 })
        .collect();

    // Global dB normalization over a fixed range below the loudest band value.
    let max_db = 10.0 * (peak_power + POWER_FLOOR).log10();
    let floor_db = max_db - DYNAMIC_RANGE_DB;
    let bands: Vec<Vec<f32>> = raw
        .iter()
        .map(|f| {
            f.band_power
                .iter()
                .map(|&p| {
                    if peak_power <= POWER_FLOOR {
                        return 0.0;
                    }
                    let db = 10.0 * (p + POWER_FLOOR).log10();
                    ((db - floor_db) / DYNAMIC_RANGE_DB).clamp(0.0, 1.0)
                })
                .collect()
        })
        .collect();

    let onsets = detect_onsets(&bands, fps);

    let decay = RELEASE_PER_FRAME_AT_30FPS.powf(30.0 / fps as f32);
    let mut held: Vec<f32> = bands[0].clone();

    let mut frames = Vec::with_capacity(n);
    for (i, frame) in raw.into_iter().enumerate() {
        if i > 0 {
            for (h, &b) in held.iter_mut().zip(bands[i].iter()) {
                *h = b.max(*h * decay);
            }
        }

        let lo = i.saturating_sub(ENVELOPE_RADIUS);
        let hi = (i + ENVELOPE_RADIUS + 1).min(n);
        let envelope = amplitudes[lo..hi].iter().sum::<f32>() / (hi - lo) as f32;

        frames.push(AudioFeatureFrame {
            frame_index: i,
            timestamp: i as f32 / fps as f32,
            amplitude: amplitudes[i],
            envelope,
            bands: bands[i].clone(),
            held_bands: held.clone(),
            waveform: frame.waveform,
            onset: onsets[i],
        });
    }

    let onset_count = frames.iter().filter(|f| f.onset).count();
    log::info!(
        "Features: {} frames, {} bands, {} onsets, peak_rms={:.4}",
        frames.len(),
        NUM_BANDS,
        onset_count,
        peak_rms
    );

    frames
}

/// Positive spectral flux against an adaptive local threshold.
fn detect_onsets(bands: &[Vec<f32>], fps: u32) -> Vec<bool> {
    let n = bands.len();
    let mut flux = vec![0.0f32; n];
    for i in 1..n {
        flux[i] = bands[i]
            .iter()
            .zip(bands[i - 1].iter())
            .map(|(cur, prev)| (cur - prev).max(0.0))
            .sum();
    }

    let window = ((ONSET_WINDOW_SECONDS * fps as f32).round() as usize).max(1);
    let min_gap = ((MIN_ONSET_GAP_SECONDS * fps as f32).ceil() as usize).max(1);

    let mut onsets = vec![false; n];
    let mut last: Option<usize> = None;

    for i in 0..n {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(n);
        let local_mean = flux[start..end].iter().sum::<f32>() / (end - start) as f32;
        let threshold = local_mean * 1.5 + 0.01;

        if flux[i] <= threshold {
            continue;
        }

        let is_peak = (i == 0 || flux[i] >= flux[i - 1]) && (i + 1 == n || flux[i] >= flux[i + 1]);
        let far_enough = last.map_or(true, |l| i - l >= min_gap);

        if is_peak && far_enough {
            onsets[i] = true;
            last = Some(i);
        }
    }

    onsets
}

/// FFT bin ranges `[lo, hi)` for each log-spaced band.
fn band_bins(sample_rate: u32) -> Vec<(usize, usize)> {
    let half = FFT_SIZE / 2;
    let resolution = sample_rate as f32 / FFT_SIZE as f32;
    let max_hz = MAX_BAND_HZ.min(sample_rate as f32 / 2.0).max(MIN_BAND_HZ * 2.0);
    let ratio = max_hz / MIN_BAND_HZ;

    (0..NUM_BANDS)
        .map(|k| {
            let f_lo = MIN_BAND_HZ * ratio.powf(k as f32 / NUM_BANDS as f32);
            let f_hi = MIN_BAND_HZ * ratio.powf((k + 1) as f32 / NUM_BANDS as f32);
            let lo = ((f_lo / resolution) as usize).min(half - 1);
            let hi = ((f_hi / resolution) as usize).clamp(lo + 1, half);
            (lo, hi)
        })
        .collect()
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::tests::sine;

    #[test]
    fn frame_count_matches_ceil() {
        for &(duration, fps, expected) in &[
            (10.0f32, 30u32, 300usize),
            (1.0, 24, 24),
            (1.01, 30, 31),
            (0.5, 60, 30),
            (2.999, 25, 75),
            (0.001, 30, 1),
        ] {
            assert_eq!(frame_count(duration, fps), expected, "{duration}s @ {fps}fps");
        }
    }

    #[test]
    fn table_is_contiguous_and_bounded() {
        let sr = 22050;
        let samples = sine(220.0, 2.0, sr, 0.8);
        for fps in [24u32, 30, 60] {
            let frames = extract(&samples, sr, fps, 2.0).unwrap();
            assert_eq!(frames.len(), 2 * fps as usize);
            for (i, f) in frames.iter().enumerate() {
                assert_eq!(f.frame_index, i);
                assert!((f.timestamp - i as f32 / fps as f32).abs() < 1e-6);
                assert!((0.0..=1.0).contains(&f.amplitude));
                assert!((0.0..=1.0).contains(&f.envelope));
                assert_eq!(f.bands.len(), NUM_BANDS);
                assert_eq!(f.waveform.len(), WAVEFORM_POINTS);
                assert!(f.bands.iter().all(|b| (0.0..=1.0).contains(b)));
            }
        }
    }

    #[test]
    fn trailing_partial_window_is_padded() {
        let sr = 8000;
        // 1.01s → 31 frames; the last window is mostly past the buffer.
        let samples = sine(300.0, 1.01, sr, 0.5);
        let frames = extract(&samples, sr, 30, 1.01).unwrap();
        assert_eq!(frames.len(), 31);
        let last = frames.last().unwrap();
        assert!(last.amplitude < frames[10].amplitude);

        // Declared duration longer than the buffer: pure silence rows.
        let frames = extract(&samples, sr, 30, 2.0).unwrap();
        assert_eq!(frames.len(), 60);
        assert_eq!(frames[59].amplitude, 0.0);
    }

    #[test]
    fn loudest_window_normalizes_to_one() {
        let sr = 16000;
        let mut samples = sine(440.0, 1.0, sr, 0.1);
        samples.extend(sine(440.0, 1.0, sr, 0.9));
        let frames = extract(&samples, sr, 20, 2.0).unwrap();

        let max = frames.iter().map(|f| f.amplitude).fold(0.0f32, f32::max);
        assert!((max - 1.0).abs() < 1e-6);
        assert!(frames[5].amplitude < 0.2);
        assert!(frames[30].amplitude > 0.9);
    }

    #[test]
    fn silence_has_no_energy_or_onsets() {
        let frames = extract(&vec![0.0; 44100], 44100, 30, 1.0).unwrap();
        assert_eq!(frames.len(), 30);
        for f in &frames {
            assert_eq!(f.amplitude, 0.0);
            assert!(f.bands.iter().all(|&b| b == 0.0));
            assert!(!f.onset);
        }
    }

    #[test]
    fn tone_lands_in_matching_band() {
        let sr = 44100;
        let frames = extract(&sine(1000.0, 1.0, sr, 0.7), sr, 30, 1.0).unwrap();
        let mid = &frames[15];
        let (peak_band, _) = mid
            .bands
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |acc, (i, &b)| if b > acc.1 { (i, b) } else { acc });

        let (lo, hi) = band_bins(sr)[peak_band];
        let resolution = sr as f32 / FFT_SIZE as f32;
        let lo_hz = lo as f32 * resolution;
        let hi_hz = hi as f32 * resolution;
        assert!(lo_hz <= 1000.0 + resolution && hi_hz >= 1000.0 - resolution, "{lo_hz}-{hi_hz}");
    }

    #[test]
    fn bursts_trigger_onsets() {
        let sr = 22050;
        let mut samples = vec![0.0f32; sr as usize * 2];
        // Short noise-like bursts every 0.5s.
        for burst in 0..4 {
            let start = burst * sr as usize / 2;
            for i in 0..(sr as usize / 20) {
                let t = i as f32 / sr as f32;
                samples[start + i] = 0.8 * ((t * 3000.0).sin() + (t * 7919.0).sin()) * 0.5;
            }
        }
        let frames = extract(&samples, sr, 30, 2.0).unwrap();
        let onsets: Vec<usize> = frames.iter().filter(|f| f.onset).map(|f| f.frame_index).collect();
        assert!(onsets.len() >= 3, "onsets: {onsets:?}");
        for pair in onsets.windows(2) {
            assert!(pair[1] - pair[0] >= 3);
        }
    }

    #[test]
    fn held_bands_release_slowly() {
        let sr = 22050;
        let mut samples = sine(500.0, 0.5, sr, 0.9);
        samples.extend(vec![0.0; sr as usize / 2]);
        let frames = extract(&samples, sr, 30, 1.0).unwrap();

        let after = &frames[18];
        let band_sum: f32 = after.bands.iter().sum();
        let held_sum: f32 = after.held_bands.iter().sum();
        assert!(held_sum > band_sum);
        for f in &frames {
            for (h, b) in f.held_bands.iter().zip(&f.bands) {
                assert!(h >= b);
            }
        }
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(
            extract(&[], 44100, 30, 0.0),
            Err(RenderError::InvalidAudio { .. })
        ));
        assert!(matches!(
            extract(&[0.1; 10], 44100, 30, 0.0),
            Err(RenderError::InvalidAudio { .. })
        ));
        assert!(matches!(
            extract(&[0.1; 10], 44100, 0, 1.0),
            Err(RenderError::Configuration(_))
        ));
    }

    #[test]
    fn extraction_is_deterministic() {
        let sr = 22050;
        let samples = sine(330.0, 1.0, sr, 0.6);
        let a = extract(&samples, sr, 30, 1.0).unwrap();
        let b = extract(&samples, sr, 30, 1.0).unwrap();
        assert_eq!(a, b);
    }
}
