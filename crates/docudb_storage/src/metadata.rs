//! Per-collection metadata records.

use chrono::{DateTime, Utc};
use docudb_codec::StorageFormat;
use serde::{Deserialize, Serialize};

/// Metadata persisted alongside each collection's documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMetadata {
    /// Collection name.
    pub name: String,
    /// When the collection was first created.
    pub created: DateTime<Utc>,
    /// When the metadata was last rewritten.
    pub updated: DateTime<Utc>,
    /// Encoding of the document files.
    pub format: StorageFormat,
    /// Whether document files are gzip-compressed.
    pub compression: bool,
    /// Number of document files.
    pub document_count: usize,
}

impl CollectionMetadata {
    /// Creates metadata for a new, empty collection.
    #[must_use]
    pub fn new(name: impl Into<String>, format: StorageFormat, compression: bool) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            created: now,
            updated: now,
            format,
            compression,
            document_count: 0,
        }
    }

    /// Applies a signed change to the document count and bumps `updated`.
    pub fn adjust_count(&mut self, delta: isize) {
        self.document_count = self.document_count.saturating_add_signed(delta);
        self.updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_camel_case_keys() {
        let meta = CollectionMetadata::new("users", StorageFormat::Hybrid, true);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["name"], "users");
        assert_eq!(json["format"], "hybrid");
        assert_eq!(json["compression"], true);
        assert_eq!(json["documentCount"], 0);
        assert!(json["created"].is_string());
    }

    #[test]
    fn count_never_underflows() {
        let mut meta = CollectionMetadata::new("c", StorageFormat::Json, false);
        meta.adjust_count(1);
        meta.adjust_count(-1);
        meta.adjust_count(-1);
        assert_eq!(meta.document_count, 0);
    }
}
