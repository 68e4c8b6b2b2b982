//! Error types for maya-tts-rs.

use std::fmt;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or missing request field. The message is reported verbatim.
    #[error("{0}")]
    Validation(String),

    /// The generator produced no usable audio-code tokens.
    #[error("no audio tokens produced: {0}")]
    GenerationEmpty(String),

    /// Failure inside the codec decode transform.
    #[error("codec: {0}")]
    Codec(String),

    /// Storage upload failure. Never escalated to request failure.
    #[error("upload: {0}")]
    Upload(String),

    /// Candle tensor/model error.
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),

    /// Tokenizer error.
    #[error("tokenizer: {0}")]
    Tokenizer(TokenizerError),

    /// Audio container error (WAV encode/decode).
    #[error("audio: {0}")]
    Audio(String),

    /// Model weight loading error.
    #[error("weight loading: {0}")]
    WeightLoad(String),

    /// Invalid configuration.
    #[error("config: {0}")]
    Config(String),

    /// Generation manager failure (worker gone, load failed).
    #[error("manager: {0}")]
    Manager(String),

    /// I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// HuggingFace Hub error.
    #[error("hf-hub: {0}")]
    HfHub(String),
}

/// Coarse error classes reported by the request orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    GenerationEmpty,
    Codec,
    Upload,
    Unexpected,
}

impl Error {
    /// Classify this error for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::GenerationEmpty(_) => ErrorKind::GenerationEmpty,
            Error::Codec(_) => ErrorKind::Codec,
            Error::Upload(_) => ErrorKind::Upload,
            _ => ErrorKind::Unexpected,
        }
    }
}

/// Wrapper for tokenizer errors (tokenizers::Error doesn't impl std::error::Error).
#[derive(Debug)]
pub struct TokenizerError(pub String);

impl fmt::Display for TokenizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<tokenizers::Error> for Error {
    fn from(error: tokenizers::Error) -> Self {
        Error::Tokenizer(TokenizerError(error.to_string()))
    }
}

impl From<hound::Error> for Error {
    fn from(error: hound::Error) -> Self {
        Error::Audio(error.to_string())
    }
}

impl From<hf_hub::api::sync::ApiError> for Error {
    fn from(error: hf_hub::api::sync::ApiError) -> Self {
        Error::HfHub(error.to_string())
    }
}
