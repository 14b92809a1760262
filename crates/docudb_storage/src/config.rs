//! Storage engine configuration.

use crate::error::{StorageError, StorageResult};
use docudb_codec::{DocumentCodec, StorageFormat};
use std::path::{Path, PathBuf};

/// Configuration for a [`StorageEngine`](crate::StorageEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Root directory holding `collections/`, `metadata/` and `indexes/`.
    pub base_path: PathBuf,

    /// Encoding used for document files.
    pub format: StorageFormat,

    /// Whether document files are gzip-compressed.
    pub compression: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("data"),
            format: StorageFormat::Json,
            compression: false,
        }
    }
}

impl StorageConfig {
    /// Creates a configuration rooted at `base_path` with default settings.
    #[must_use]
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Sets the document encoding.
    #[must_use]
    pub const fn format(mut self, format: StorageFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the document encoding by name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown format names.
    pub fn format_name(self, name: &str) -> StorageResult<Self> {
        let format = name
            .parse::<StorageFormat>()
            .map_err(|err| StorageError::configuration(err.to_string()))?;
        Ok(self.format(format))
    }

    /// Enables or disables gzip compression.
    #[must_use]
    pub const fn compression(mut self, value: bool) -> Self {
        self.compression = value;
        self
    }

    /// Returns the codec for this configuration.
    #[must_use]
    pub const fn codec(&self) -> DocumentCodec {
        DocumentCodec::new(self.format, self.compression)
    }
}
