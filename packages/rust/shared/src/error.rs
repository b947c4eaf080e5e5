//! Error types for the asset build pipeline.
//!
//! Library crates use [`GeoAssetError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum GeoAssetError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// HTTP error while delivering a status callback.
    #[error("network error: {0}")]
    Network(String),

    /// Database or object storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (missing rows, malformed documents, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A raster URI that does not follow the storage layout convention.
    #[error("invalid address '{uri}': {reason}")]
    InvalidAddress { uri: String, reason: String },

    /// A geometry that could not be parsed, repaired or projected.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// The target raster holds tiles the source does not have.
    #[error(
        "target contains {} tile(s) absent from source: {}",
        unique_to_target.len(),
        unique_to_target.join(", ")
    )]
    IntegrityViolation { unique_to_target: Vec<String> },

    /// A single tile copy failed.
    #[error("failed to copy tile {tile}: {message}")]
    Copy { tile: String, message: String },

    /// A supervised process could not be started or awaited.
    #[error("process error: {0}")]
    Process(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GeoAssetError>;

impl GeoAssetError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an address error for `uri`.
    pub fn invalid_address(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
