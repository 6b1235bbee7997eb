use std::path::{Path, PathBuf};

use crate::error::{RenderError, RenderResult};

/// Whisper model names and the ggml files they are published as.
const KNOWN_MODELS: &[(&str, &str)] = &[
    ("tiny", "ggml-tiny.bin"),
    ("tiny.en", "ggml-tiny.en.bin"),
    ("base", "ggml-base.bin"),
    ("base.en", "ggml-base.en.bin"),
    ("small", "ggml-small.bin"),
    ("small.en", "ggml-small.en.bin"),
    ("medium", "ggml-medium.bin"),
    ("medium.en", "ggml-medium.en.bin"),
    ("large", "ggml-large-v3-turbo.bin"),
];

const MODEL_REPO: &str = "ggerganov/whisper.cpp";

fn model_file(name: &str) -> RenderResult<&'static str> {
    KNOWN_MODELS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, file)| *file)
        .ok_or_else(|| {
            let names: Vec<&str> = KNOWN_MODELS.iter().map(|(n, _)| *n).collect();
            RenderError::config(format!(
                "unknown Whisper model '{name}'; expected one of {} or a model file path",
                names.join(", ")
            ))
        })
}

/// Directory holding downloaded speech models.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `configured` when set (`[subtitle] cache_dir`), else the user cache.
    pub fn locate(configured: Option<&Path>) -> RenderResult<Self> {
        if let Some(dir) = configured {
            return Ok(Self::new(dir));
        }
        let base = dirs::cache_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| RenderError::transcription("cannot determine a cache directory for models"))?;
        Ok(Self::new(base.join("sonoframe").join("models")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// A model file for `model`: an existing path as given, otherwise a known
    /// name stored here, fetched on first use.
    pub fn resolve(&self, model: &str) -> RenderResult<PathBuf> {
        let as_path = Path::new(model);
        if as_path.is_file() {
            log::info!("Using Whisper model file {}", as_path.display());
            return Ok(as_path.to_path_buf());
        }

        let file = model_file(model)?;
        let stored = self.dir.join(file);
        if stored.is_file() {
            log::info!("Using stored Whisper model '{model}': {}", stored.display());
            return Ok(stored);
        }

        std::fs::create_dir_all(&self.dir)?;
        log::info!("Downloading Whisper model '{model}' into {}", self.dir.display());
        fetch(file, &stored)?;
        Ok(stored)
    }
}

#[cfg(feature = "subtitles")]
fn fetch(file: &str, dest: &Path) -> RenderResult<()> {
    use hf_hub::api::sync::Api;

    let api = Api::new()
        .map_err(|e| RenderError::transcription(format!("failed to initialize HuggingFace Hub API: {e}")))?;
    let downloaded = api
        .model(MODEL_REPO.to_string())
        .get(file)
        .map_err(|e| RenderError::transcription(format!("failed to download model '{file}': {e}")))?;

    // hf-hub keeps its own cache; copy into the store
    if downloaded != dest {
        std::fs::copy(&downloaded, dest)?;
    }
    Ok(())
}

#[cfg(not(feature = "subtitles"))]
fn fetch(file: &str, _dest: &Path) -> RenderResult<()> {
    Err(RenderError::transcription(format!(
        "cannot download '{file}' from {MODEL_REPO} without the 'subtitles' feature"
    )))
}
