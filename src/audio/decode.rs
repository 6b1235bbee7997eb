use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{RenderError, RenderResult};

/// Mono PCM at the source sample rate.
#[derive(Clone, Debug)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioData {
    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

pub fn decode_audio(path: &Path) -> RenderResult<AudioData> {
    let invalid = |reason: String| RenderError::invalid_audio(path, reason);

    let file = std::fs::File::open(path).map_err(|e| invalid(format!("cannot open: {e}")))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| invalid(format!("unrecognised format: {e}")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| invalid("no audio tracks found".into()))?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count()).max(1);
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| invalid("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| invalid(format!("unsupported codec: {e}")))?;

    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(invalid(format!("read failed: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(invalid(format!("decode failed: {e}"))),
        };

        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        let samples = sample_buf.samples();

        if channels == 1 {
            all_samples.extend_from_slice(samples);
        } else {
            for frame_samples in samples.chunks(channels) {
                all_samples.push(frame_samples.iter().sum::<f32>() / channels as f32);
            }
        }
    }

    if all_samples.is_empty() {
        return Err(invalid("zero-length audio".into()));
    }

    let data = AudioData {
        samples: all_samples,
        sample_rate,
    };

    log::info!(
        "Decoded {}: {} samples, {}Hz, {:.2}s",
        path.display(),
        data.samples.len(),
        sample_rate,
        data.duration()
    );

    Ok(data)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Writes a 16-bit mono or stereo WAV for decode-based tests.
    pub(crate) fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[f32]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }

    pub(crate) fn sine(freq: f32, seconds: f32, sample_rate: u32, amp: f32) -> Vec<f32> {
        let n = (seconds * sample_rate as f32).round() as usize;
        (0..n)
            .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn decodes_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 22050, 1, &sine(440.0, 1.0, 22050, 0.5));

        let audio = decode_audio(&path).unwrap();
        assert_eq!(audio.sample_rate, 22050);
        assert_eq!(audio.samples.len(), 22050);
        assert!((audio.duration() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn downmixes_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        // Left at +0.5, right at -0.5: mono mix cancels out.
        let interleaved: Vec<f32> = (0..2000).flat_map(|_| [0.5, -0.5]).collect();
        write_wav(&path, 8000, 2, &interleaved);

        let audio = decode_audio(&path).unwrap();
        assert_eq!(audio.samples.len(), 2000);
        assert!(audio.samples.iter().all(|s| s.abs() < 1e-3));
    }

    #[test]
    fn missing_file_is_invalid_audio() {
        let err = decode_audio(Path::new("/nonexistent/intro.wav")).unwrap_err();
        assert!(matches!(err, RenderError::InvalidAudio { .. }));
        assert!(err.to_string().contains("intro.wav"));
    }

    #[test]
    fn garbage_is_invalid_audio() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"definitely not a riff header").unwrap();
        assert!(matches!(
            decode_audio(&path),
            Err(RenderError::InvalidAudio { .. })
        ));
    }

    #[test]
    fn empty_wav_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_wav(&path, 44100, 1, &[]);
        assert!(matches!(
            decode_audio(&path),
            Err(RenderError::InvalidAudio { .. })
        ));
    }
}
