//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding documents.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The JSON text could not be produced or parsed.
    #[error("JSON error: {message}")]
    Json {
        /// Description of the JSON error.
        message: String,
    },

    /// The stored checksum does not match the payload.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    Corruption {
        /// Checksum stored in the frame (hex).
        expected: String,
        /// Checksum computed over the payload (hex).
        actual: String,
    },

    /// The byte buffer ended before a frame field was complete.
    #[error("truncated frame: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes required by the field being read.
        needed: usize,
        /// Bytes remaining in the buffer.
        available: usize,
    },

    /// Gzip compression or decompression failed.
    #[error("compression error: {message}")]
    Compression {
        /// Description of the failure.
        message: String,
    },

    /// The decoded value is not a valid document.
    #[error("invalid document: {message}")]
    InvalidDocument {
        /// Why the document was rejected.
        message: String,
    },
}

impl CodecError {
    /// Creates a JSON error.
    pub fn json(message: impl Into<String>) -> Self {
        Self::Json {
            message: message.into(),
        }
    }

    /// Creates a corruption error from two checksums.
    pub fn corruption(expected: &[u8], actual: &[u8]) -> Self {
        Self::Corruption {
            expected: crate::checksum::to_hex(expected),
            actual: crate::checksum::to_hex(actual),
        }
    }

    /// Creates a compression error.
    pub fn compression(message: impl Into<String>) -> Self {
        Self::Compression {
            message: message.into(),
        }
    }

    /// Creates an invalid document error.
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    /// Returns true if this error means the stored bytes are damaged.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. } | Self::Truncated { .. })
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::json(err.to_string())
    }
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::compression(err.to_string())
    }
}
