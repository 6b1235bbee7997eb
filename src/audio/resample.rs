use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{RenderError, RenderResult};

/// Input frames fed to the resampler per call.
const CHUNK_FRAMES: usize = 1024;

fn resample_error(e: impl std::fmt::Display) -> RenderError {
    RenderError::config(format!("resampling failed: {e}"))
}

/// Resample mono f32 audio from `from_rate` to `to_rate` using rubato.
///
/// The output always has exactly `round(len * to_rate / from_rate)` samples,
/// aligned with the input: the filter delay is dropped from the front and the
/// filter tail is drained at the end, so clip placement on a timeline stays
/// sample-accurate.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> RenderResult<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(RenderError::config(format!(
            "cannot resample between {from_rate}Hz and {to_rate}Hz"
        )));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let target_len = (samples.len() as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_FRAMES, 1)
        .map_err(|e| RenderError::config(format!("failed to create resampler: {e}")))?;
    let delay = resampler.output_delay();
    let wanted = delay + target_len;
    let mut out: Vec<f32> = Vec::with_capacity(wanted + resampler.output_frames_max());

    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let next = pos + resampler.input_frames_next();
        let input: [&[f32]; 1] = [&samples[pos..next]];
        let chunk = resampler
            .process(&input[..], None)
            .map_err(resample_error)?;
        out.extend_from_slice(&chunk[0]);
        pos = next;
    }
    if pos < samples.len() {
        let input: [&[f32]; 1] = [&samples[pos..]];
        let chunk = resampler
            .process_partial(Some(&input[..]), None)
            .map_err(resample_error)?;
        out.extend_from_slice(&chunk[0]);
    }
    // Flush the filter with silence until the delayed tail is out.
    while out.len() < wanted {
        let chunk = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(resample_error)?;
        if chunk[0].is_empty() {
            break;
        }
        out.extend_from_slice(&chunk[0]);
    }

    out.drain(..delay.min(out.len()));
    out.resize(target_len, 0.0);

    log::debug!(
        "Resampled {} samples {}Hz -> {} samples {}Hz (delay {})",
        samples.len(),
        from_rate,
        out.len(),
        to_rate,
        delay
    );
    Ok(out)
}
