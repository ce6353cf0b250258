//! Error types for the lesson_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for lesson_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Blob store or settings store rejected an operation
    #[error("Storage error: {0}")]
    Storage(String),

    /// Imported backup document is missing or has malformed fields
    #[error("Import failed: {0}")]
    ImportValidation(String),

    /// An audio source did not yield usable metadata
    #[error("Metadata probe failed: {0}")]
    MetadataProbe(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for failures of the persistence collaborators.
    ///
    /// These are surfaced as non-fatal notices rather than aborting the
    /// operation that triggered them.
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Storage(_))
    }
}
