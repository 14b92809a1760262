//! On-disk directory layout.
//!
//! ```text
//! <base>/
//! ├─ collections/<name>/<id>.<ext>[.gz]   # one file per document
//! ├─ metadata/<name>.meta.json            # per-collection metadata
//! └─ indexes/<name>/<field>.idx           # one file per field index
//! ```

use crate::error::{StorageError, StorageResult};
use std::path::{Path, PathBuf};

/// Directory holding per-collection document directories.
pub const COLLECTIONS_DIR: &str = "collections";
/// Directory holding metadata files.
pub const METADATA_DIR: &str = "metadata";
/// Directory holding per-collection index directories.
pub const INDEXES_DIR: &str = "indexes";
/// Suffix of metadata files.
pub const METADATA_SUFFIX: &str = ".meta.json";
/// Suffix of index files.
pub const INDEX_SUFFIX: &str = ".idx";

/// Checks that `name` can be used as a single path component.
pub fn validate_name(kind: &'static str, name: &str) -> StorageResult<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.chars().any(|c| matches!(c, '/' | '\\' | '\0'));
    if bad {
        return Err(StorageError::InvalidName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Path builder for a storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    base: PathBuf,
}

impl Layout {
    /// Creates a layout rooted at `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// `<base>/collections`.
    #[must_use]
    pub fn collections_dir(&self) -> PathBuf {
        self.base.join(COLLECTIONS_DIR)
    }

    /// `<base>/collections/<name>`.
    #[must_use]
    pub fn collection_dir(&self, name: &str) -> PathBuf {
        self.collections_dir().join(name)
    }

    /// `<base>/metadata`.
    #[must_use]
    pub fn metadata_dir(&self) -> PathBuf {
        self.base.join(METADATA_DIR)
    }

    /// `<base>/metadata/<name>.meta.json`.
    #[must_use]
    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.metadata_dir().join(format!("{name}{METADATA_SUFFIX}"))
    }

    /// `<base>/indexes`.
    #[must_use]
    pub fn indexes_dir(&self) -> PathBuf {
        self.base.join(INDEXES_DIR)
    }

    /// `<base>/indexes/<name>`.
    #[must_use]
    pub fn index_dir(&self, name: &str) -> PathBuf {
        self.indexes_dir().join(name)
    }

    /// `<base>/indexes/<name>/<field>.idx`.
    #[must_use]
    pub fn index_path(&self, name: &str, field: &str) -> PathBuf {
        self.index_dir(name).join(format!("{field}{INDEX_SUFFIX}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths() {
        let layout = Layout::new("/db");
        assert_eq!(
            layout.collection_dir("users"),
            PathBuf::from("/db/collections/users")
        );
        assert_eq!(
            layout.metadata_path("users"),
            PathBuf::from("/db/metadata/users.meta.json")
        );
        assert_eq!(
            layout.index_path("users", "profile.email"),
            PathBuf::from("/db/indexes/users/profile.email.idx")
        );
    }

    #[test]
    fn names_must_be_single_components() {
        assert!(validate_name("collection", "users").is_ok());
        assert!(validate_name("document", "a.b-c_d").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b", "nul\0"] {
            assert!(validate_name("collection", bad).is_err(), "{bad:?}");
        }
    }
}
