//! Error types for voxstream operations

use thiserror::Error;

/// Main error type for volume pipeline operations
#[derive(Error, Debug)]
pub enum VoxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Source read error: {0}")]
    SourceRead(String),

    #[error("Buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Build cancelled: superseded by a newer request")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Specialized Result type for volume pipeline operations
pub type Result<T> = std::result::Result<T, VoxError>;

impl From<serde_json::Error> for VoxError {
    fn from(err: serde_json::Error) -> Self {
        VoxError::Serialization(err.to_string())
    }
}
