//! Error types for the resource agent.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors returned by stores, controllers and providers.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request or missing required fields.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No matching record, or the record was invalidated by drift detection.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate name on create.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Store queried with a field that does not exist or is not a string.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Resource kind or feature not implemented by the bound provider.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Configuration names a provider backend nobody implements.
    #[error("unknown provider backend '{backend}' for {kind}")]
    UnknownBackend { kind: String, backend: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_saphyr::Error,
    },

    #[error("failed to encode record {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_saphyr::ser::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(action: &str, path: &Path, source: std::io::Error) -> Self {
        Error::Io {
            context: format!("failed to {} {}", action, path.display()),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, Error>;
