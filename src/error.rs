use std::path::Path;

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("invalid audio '{origin}': {reason}")]
    InvalidAudio { origin: String, reason: String },

    #[error("invalid image '{path}': {reason}")]
    InvalidImage { path: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transcription error: {0}")]
    Transcription(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RenderError {
    pub fn invalid_audio(origin: &Path, reason: impl ToString) -> Self {
        Self::InvalidAudio {
            origin: origin.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_image(path: &Path, reason: impl ToString) -> Self {
        Self::InvalidImage {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn transcription(msg: impl Into<String>) -> Self {
        Self::Transcription(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn messages_name_the_failing_path() {
        let err = RenderError::invalid_audio(&PathBuf::from("intro.wav"), "no audio tracks");
        let msg = err.to_string();
        assert!(msg.contains("intro.wav"));
        assert!(msg.contains("no audio tracks"));

        let err = RenderError::invalid_image(&PathBuf::from("bg.png"), "truncated");
        assert!(err.to_string().contains("bg.png"));
    }

    #[test]
    fn display_prefixes_are_stable() {
        assert!(RenderError::config("x").to_string().starts_with("configuration error:"));
        assert!(RenderError::transcription("x").to_string().starts_with("transcription error:"));
        assert!(RenderError::encoding("x").to_string().starts_with("encoding error:"));
    }

    #[test]
    fn io_errors_convert() {
        let err: RenderError = std::io::Error::other("boom").into();
        assert!(err.to_string().contains("boom"));
    }
}
