//! Error types for DocuDB core.

use crate::query::QueryError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in DocuDB core operations.
///
/// "Not found" is never an error: lookups return `Option`, and deletes
/// or updates that match nothing report zero counts.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage engine error, propagated unchanged.
    #[error("storage error: {0}")]
    Storage(#[from] docudb_storage::StorageError),

    /// Document codec error.
    #[error("codec error: {0}")]
    Codec(#[from] docudb_codec::CodecError),

    /// The database configuration is unusable.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// A collection or document limit was reached.
    #[error("capacity exceeded: {message}")]
    Capacity {
        /// Which limit was hit.
        message: String,
    },

    /// A unique index already maps the value to another document.
    #[error("duplicate value {value} for unique field '{field}' in collection '{collection}'")]
    Uniqueness {
        /// Collection owning the index.
        collection: String,
        /// Indexed field.
        field: String,
        /// The duplicated value, as JSON.
        value: String,
    },

    /// The filter could not be evaluated.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// The update document is malformed or cannot be applied.
    #[error("invalid update: {message}")]
    InvalidUpdate {
        /// Description of the problem.
        message: String,
    },

    /// A document is malformed.
    #[error("invalid document: {message}")]
    InvalidDocument {
        /// Description of the problem.
        message: String,
    },

    /// A persisted index file could not be decoded.
    #[error("index corruption in '{collection}.{field}': {message}")]
    IndexCorruption {
        /// Collection owning the index.
        collection: String,
        /// Indexed field.
        field: String,
        /// Description of the damage.
        message: String,
    },

    /// Operation not permitted.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a capacity error.
    pub fn capacity(message: impl Into<String>) -> Self {
        Self::Capacity {
            message: message.into(),
        }
    }

    /// Creates a uniqueness error.
    pub fn uniqueness(
        collection: impl Into<String>,
        field: impl Into<String>,
        value: &serde_json::Value,
    ) -> Self {
        Self::Uniqueness {
            collection: collection.into(),
            field: field.into(),
            value: value.to_string(),
        }
    }

    /// Creates an invalid update error.
    pub fn invalid_update(message: impl Into<String>) -> Self {
        Self::InvalidUpdate {
            message: message.into(),
        }
    }

    /// Creates an invalid document error.
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    /// Creates an index corruption error.
    pub fn index_corruption(
        collection: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::IndexCorruption {
            collection: collection.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if the error reports damaged on-disk data.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        match self {
            Self::Storage(err) => err.is_corruption(),
            Self::Codec(err) => err.is_corruption(),
            Self::IndexCorruption { .. } => true,
            _ => false,
        }
    }

    /// Returns true for uniqueness violations.
    #[must_use]
    pub fn is_uniqueness(&self) -> bool {
        matches!(self, Self::Uniqueness { .. })
    }

    /// Returns true for capacity errors.
    #[must_use]
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::Capacity { .. })
    }
}
