use std::path::Path;

use super::segment::SubtitleSegment;
use crate::error::{RenderError, RenderResult};

/// Read a finalized transcript: a JSON array of `{start, end, text}`.
pub fn load_transcript(path: &Path) -> RenderResult<Vec<SubtitleSegment>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        RenderError::transcription(format!("cannot read transcript {}: {e}", path.display()))
    })?;
    serde_json::from_str(&contents).map_err(|e| {
        RenderError::transcription(format!("invalid transcript {}: {e}", path.display()))
    })
}

#[cfg(feature = "subtitles")]
pub use whisper::WhisperTranscriber;

#[cfg(feature = "subtitles")]
mod whisper {
    use std::path::Path;

    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    use crate::subtitle::cache::Transcriber;
    use crate::audio::decode::AudioData;
    use crate::audio::resample::resample;
    use crate::error::{RenderError, RenderResult};
    use crate::subtitle::segment::SubtitleSegment;

    const WHISPER_SAMPLE_RATE: u32 = 16000;

    pub struct WhisperTranscriber {
        ctx: WhisperContext,
        model: String,
        language: Option<String>,
    }

    impl WhisperTranscriber {
        pub fn new(model_path: &Path, model: &str, language: Option<&str>) -> RenderResult<Self> {
            let path = model_path.to_str().ok_or_else(|| {
                RenderError::transcription("model path contains invalid UTF-8")
            })?;
            let ctx = WhisperContext::new_with_params(path, WhisperContextParameters::default())
                .map_err(|e| {
                    RenderError::transcription(format!("failed to initialize Whisper context: {e}"))
                })?;

            Ok(Self {
                ctx,
                model: model.to_string(),
                language: language.map(String::from),
            })
        }

        /// One segment per word; BPE tokens are reassembled into whole words.
        fn transcribe_words(&self, samples_16k: &[f32]) -> RenderResult<Vec<SubtitleSegment>> {
            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            params.set_token_timestamps(true);
            params.set_print_special(false);
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_print_timestamps(false);

            if let Some(ref lang) = self.language {
                params.set_language(Some(lang));
            }

            let mut state = self.ctx.create_state().map_err(|e| {
                RenderError::transcription(format!("failed to create Whisper state: {e}"))
            })?;

            state
                .full(params, samples_16k)
                .map_err(|e| RenderError::transcription(format!("Whisper failed: {e}")))?;

            let mut words = Vec::new();
            for i in 0..state.full_n_segments() {
                let segment = state.get_segment(i).ok_or_else(|| {
                    RenderError::transcription(format!("segment {i} out of bounds"))
                })?;

                let mut bytes_acc: Vec<u8> = Vec::new();
                let mut t0: i64 = 0;
                let mut t1: i64 = 0;
                let mut has_tokens = false;

                for j in 0..segment.n_tokens() {
                    let Some(token) = segment.get_token(j) else {
                        continue;
                    };
                    let data = token.token_data();
                    if data.id < 0 {
                        continue;
                    }
                    let Ok(bytes) = token.to_bytes() else {
                        continue;
                    };
                    // Special tokens: [_BEG_], [_TT_123], [_SOT_], ...
                    if bytes.is_empty() || (bytes.starts_with(b"[_") && bytes.ends_with(b"]")) {
                        continue;
                    }

                    // A leading space (or Ġ) starts a new word.
                    let starts_new_word =
                        bytes.starts_with(b" ") || bytes.starts_with(&[0xC4, 0xA0]);
                    if starts_new_word && has_tokens {
                        words.extend(flush_word(&bytes_acc, t0, t1));
                        bytes_acc.clear();
                        has_tokens = false;
                    }

                    if !has_tokens {
                        t0 = data.t0;
                        has_tokens = true;
                    }
                    t1 = data.t1;
                    bytes_acc.extend_from_slice(bytes);
                }

                if has_tokens {
                    words.extend(flush_word(&bytes_acc, t0, t1));
                }
            }

            log::debug!("Token reassembly produced {} words", words.len());
            Ok(words)
        }
    }

    impl Transcriber for WhisperTranscriber {
        fn transcribe(&self, audio: &AudioData) -> RenderResult<Vec<SubtitleSegment>> {
            let samples_16k = resample(&audio.samples, audio.sample_rate, WHISPER_SAMPLE_RATE)?;
            let words = self.transcribe_words(&samples_16k)?;
            for w in &words {
                log::debug!("  {:.2}s - {:.2}s  {:?}", w.start, w.end, w.text);
            }
            Ok(words)
        }

        fn cache_tag(&self) -> String {
            format!(
                "whisper-{}-{}",
                self.model.replace(['/', '\\', '.'], "_"),
                self.language.as_deref().unwrap_or("auto")
            )
        }
    }

    /// Whisper timestamps are in centiseconds.
    fn flush_word(bytes: &[u8], t0: i64, t1: i64) -> Option<SubtitleSegment> {
        let text = String::from_utf8_lossy(bytes);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(SubtitleSegment {
            text: trimmed.to_string(),
            start: t0 as f32 / 100.0,
            end: t1 as f32 / 100.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_transcript_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        std::fs::write(&path, r#"[{"start":0.0,"end":2.0,"text":"hi"}]"#).unwrap();
        assert_eq!(load_transcript(&path).unwrap().len(), 1);

        std::fs::write(&path, "[oops").unwrap();
        assert!(matches!(load_transcript(&path), Err(RenderError::Transcription(_))));
        assert!(load_transcript(&dir.path().join("missing.json")).is_err());
    }
}
