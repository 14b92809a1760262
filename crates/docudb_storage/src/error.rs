//! Error types for storage operations.

use docudb_codec::CodecError;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A document or metadata file could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The storage configuration is unusable.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// A collection name, document id or field name cannot be used as a path.
    #[error("invalid {kind} name: {name:?}")]
    InvalidName {
        /// What was being named (`collection`, `document`, `index`).
        kind: &'static str,
        /// The rejected name.
        name: String,
    },

    /// A document file could not be read back.
    #[error("failed to read document '{id}' in collection '{collection}': {source}")]
    Document {
        /// Collection holding the document.
        collection: String,
        /// Document id.
        id: String,
        /// Underlying codec failure.
        #[source]
        source: CodecError,
    },

    /// A backup archive or directory is malformed.
    #[error("invalid backup: {message}")]
    InvalidArchive {
        /// Description of the problem.
        message: String,
    },
}

impl StorageError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an invalid archive error.
    pub fn invalid_archive(message: impl Into<String>) -> Self {
        Self::InvalidArchive {
            message: message.into(),
        }
    }

    /// Returns true if the error reports damaged on-disk bytes.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        match self {
            Self::Codec(err) | Self::Document { source: err, .. } => err.is_corruption(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.into())
    }
}
