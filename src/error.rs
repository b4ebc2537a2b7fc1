//! Error types for PixelRTS encoding and decoding

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, PixelRtsError>;

/// Errors that can occur while encoding, decoding or inspecting containers.
///
/// Nothing is retried internally.
#[derive(Debug, Error)]
pub enum PixelRtsError {
    #[error("invalid grid size {grid_size}: {reason}")]
    InvalidGridSize { grid_size: u32, reason: String },

    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("{what} {value} out of range (limit {limit})")]
    OutOfRange {
        what: &'static str,
        value: u64,
        limit: u64,
    },

    #[error("requested {requested} bytes but container holds at most {capacity}")]
    CapacityExceeded { requested: u64, capacity: u64 },

    #[error("embedded metadata and sidecar metadata disagree")]
    MetadataConflict,

    #[error("no metadata found for {0} (expected embedded field or .meta.json sidecar)")]
    MissingMetadata(PathBuf),

    #[error("token dictionary is full (65535 distinct words)")]
    TokenSpaceExhausted,

    #[error("token id {0} is not in the instruction dictionary")]
    UnknownToken(u16),

    #[error("malformed token stream: {0}")]
    MalformedTokenStream(String),

    #[error("container encoding failed: {0}")]
    Container(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("metadata JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<png::DecodingError> for PixelRtsError {
    fn from(err: png::DecodingError) -> Self {
        match err {
            png::DecodingError::IoError(e) => PixelRtsError::Io(e),
            other => PixelRtsError::MalformedContainer(other.to_string()),
        }
    }
}

impl From<png::EncodingError> for PixelRtsError {
    fn from(err: png::EncodingError) -> Self {
        match err {
            png::EncodingError::IoError(e) => PixelRtsError::Io(e),
            other => PixelRtsError::Container(other.to_string()),
        }
    }
}
