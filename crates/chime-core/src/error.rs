//! Error types for Chime.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using Chime's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Chime.
#[derive(Error, Debug)]
pub enum Error {
    // Asset resolution errors
    #[error("Sound '{name}' not found in base path '{}'", base_path.display())]
    FileNotFound { name: String, base_path: PathBuf },

    #[error("Sound '{0}' is not loaded")]
    AssetNotFound(String),

    // Audio errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    #[error("Resample error: {0}")]
    Resample(String),

    #[error("Audio output error: {0}")]
    AudioOutput(String),

    // Caller errors
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if the error means the sound simply does not exist,
    /// as opposed to existing and failing to load.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::FileNotFound { .. } | Self::AssetNotFound(_))
    }

    /// Returns true if the error was caused by the caller's arguments.
    pub const fn is_invalid_parameter(&self) -> bool {
        matches!(self, Self::InvalidParameter(_))
    }
}
