use thiserror::Error;
use tonecast_core::ToneError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Tone(#[from] ToneError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CliError>;
