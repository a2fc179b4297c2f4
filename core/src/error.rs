use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ToneError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Calibration incomplete: {0}")]
    CalibrationIncomplete(String),

    #[error("Payload size mismatch: header declares {expected} bytes, decoded {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to detect preamble")]
    PreambleNotFound,

    #[error("Failed to detect postamble")]
    PostambleNotFound,
}

pub type Result<T> = std::result::Result<T, ToneError>;
