//! Error types for the invision daemon

use thiserror::Error;

/// Result type alias for invision operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the perception core and its backends
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Camera could not be opened or read
    #[error("camera error: {0}")]
    Camera(String),

    /// Object detection backend failed
    #[error("detection error: {0}")]
    Detection(String),

    /// Text extraction backend failed
    #[error("text extraction error: {0}")]
    Ocr(String),

    /// Speech synthesis failed
    #[error("speech error: {0}")]
    Speech(String),

    /// Utterance submitted after the speech serializer was terminated
    #[error("speech serializer is closed")]
    SpeechClosed,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding error
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
