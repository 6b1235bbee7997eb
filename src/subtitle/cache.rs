use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::segment::SubtitleSegment;
use crate::audio::decode::AudioData;
use crate::error::{RenderError, RenderResult};

/// Produces timed subtitle segments for a decoded track.
pub trait Transcriber {
    fn transcribe(&self, audio: &AudioData) -> RenderResult<Vec<SubtitleSegment>>;

    /// Part of the cache key, so different models or languages do not share entries.
    fn cache_tag(&self) -> String;
}

/// Hex SHA-256 of the file contents.
pub fn fingerprint(path: &Path) -> RenderResult<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// On-disk transcript cache, one JSON file per key.
pub struct TranscriptCache {
    dir: PathBuf,
}

impl TranscriptCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn default_location() -> Option<Self> {
        dirs::cache_dir().map(|d| Self::new(d.join("sonoframe").join("transcripts")))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// A cached transcript, if present and readable. Corrupt entries are ignored.
    pub fn load(&self, key: &str) -> Option<Vec<SubtitleSegment>> {
        let path = self.entry_path(key);
        let contents = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(segments) => Some(segments),
            Err(e) => {
                log::warn!("Ignoring corrupt transcript cache {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn store(&self, key: &str, segments: &[SubtitleSegment]) -> RenderResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(segments)
            .map_err(|e| RenderError::transcription(format!("cannot serialize transcript: {e}")))?;
        std::fs::write(self.entry_path(key), json)?;
        Ok(())
    }
}

/// Run `transcriber`, reusing a cached result for identical audio content.
pub fn transcribe_cached(
    transcriber: &dyn Transcriber,
    audio_path: &Path,
    audio: &AudioData,
    cache: Option<&TranscriptCache>,
) -> RenderResult<Vec<SubtitleSegment>> {
    let key = match cache {
        Some(_) => Some(format!("{}-{}", fingerprint(audio_path)?, transcriber.cache_tag())),
        None => None,
    };

    if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
        if let Some(segments) = cache.load(key) {
            log::info!("Using cached transcript ({} segments)", segments.len());
            return Ok(segments);
        }
    }

    let segments = transcriber.transcribe(audio)?;
    log::info!("Transcribed {} subtitle segments", segments.len());

    if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
        if let Err(e) = cache.store(key, &segments) {
            log::warn!("Failed to cache transcript: {}", e);
        }
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeTranscriber {
        calls: Cell<usize>,
        fail: bool,
    }

    impl FakeTranscriber {
        fn new() -> Self {
            Self {
                calls: Cell::new(0),
                fail: false,
            }
        }
    }

    impl Transcriber for FakeTranscriber {
        fn transcribe(&self, _audio: &AudioData) -> RenderResult<Vec<SubtitleSegment>> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(RenderError::transcription("service unavailable"));
            }
            Ok(vec![SubtitleSegment {
                start: 0.0,
                end: 1.0,
                text: "hello".into(),
            }])
        }

        fn cache_tag(&self) -> String {
            "fake".into()
        }
    }

    fn audio() -> AudioData {
        AudioData {
            samples: vec![0.0; 100],
            sample_rate: 8000,
        }
    }

    #[test]
    fn fingerprint_is_content_based() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        let c = dir.path().join("c.wav");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();
        std::fs::write(&c, b"other bytes").unwrap();

        let fa = fingerprint(&a).unwrap();
        assert_eq!(fa.len(), 64);
        assert_eq!(fa, fingerprint(&b).unwrap());
        assert_ne!(fa, fingerprint(&c).unwrap());
    }

    #[test]
    fn second_run_hits_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let track = dir.path().join("track.wav");
        std::fs::write(&track, b"pcm").unwrap();
        let cache = TranscriptCache::new(dir.path().join("cache"));
        let transcriber = FakeTranscriber::new();

        let first = transcribe_cached(&transcriber, &track, &audio(), Some(&cache)).unwrap();
        let second = transcribe_cached(&transcriber, &track, &audio(), Some(&cache)).unwrap();
        assert_eq!(first, second);
        assert_eq!(transcriber.calls.get(), 1);
    }

    #[test]
    fn no_cache_always_transcribes() {
        let dir = tempfile::tempdir().unwrap();
        let track = dir.path().join("track.wav");
        std::fs::write(&track, b"pcm").unwrap();
        let transcriber = FakeTranscriber::new();
        transcribe_cached(&transcriber, &track, &audio(), None).unwrap();
        transcribe_cached(&transcriber, &track, &audio(), None).unwrap();
        assert_eq!(transcriber.calls.get(), 2);
    }

    #[test]
    fn failures_surface_and_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let track = dir.path().join("track.wav");
        std::fs::write(&track, b"pcm").unwrap();
        let cache = TranscriptCache::new(dir.path().join("cache"));
        let transcriber = FakeTranscriber {
            calls: Cell::new(0),
            fail: true,
        };
        let err = transcribe_cached(&transcriber, &track, &audio(), Some(&cache)).unwrap_err();
        assert!(matches!(err, RenderError::Transcription(_)));
        assert!(!dir.path().join("cache").exists());
    }

    #[test]
    fn corrupt_cache_entry_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TranscriptCache::new(dir.path());
        std::fs::write(dir.path().join("key.json"), "{not json").unwrap();
        assert!(cache.load("key").is_none());
    }
}
