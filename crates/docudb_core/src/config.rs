//! Database configuration.

use docudb_codec::StorageFormat;
use docudb_storage::StorageConfig;
use indexmap::IndexMap;
use std::path::Path;

/// Index declaration for one schema field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldSpec {
    /// Whether the field gets a standard index.
    pub indexed: bool,
    /// Whether the field gets a unique index.
    pub unique: bool,
}

impl FieldSpec {
    /// A standard (non-unique) index.
    #[must_use]
    pub const fn indexed() -> Self {
        Self {
            indexed: true,
            unique: false,
        }
    }

    /// A unique index.
    #[must_use]
    pub const fn unique() -> Self {
        Self {
            indexed: true,
            unique: true,
        }
    }
}

/// Field declarations of a collection, in declaration order.
pub type Schema = IndexMap<String, FieldSpec>;

/// Per-collection options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionOptions {
    /// Inserts fail once the collection holds this many documents.
    pub max_documents: Option<usize>,

    /// Whether schema fields flagged `indexed` get an index at creation.
    ///
    /// Fields flagged `unique` are always indexed.
    pub auto_index: bool,

    /// Field declarations.
    pub schema: Schema,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            max_documents: None,
            auto_index: true,
            schema: Schema::new(),
        }
    }
}

impl CollectionOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the document limit.
    #[must_use]
    pub fn max_documents(mut self, limit: usize) -> Self {
        self.max_documents = Some(limit);
        self
    }

    /// Sets whether indexed schema fields are indexed automatically.
    #[must_use]
    pub fn auto_index(mut self, value: bool) -> Self {
        self.auto_index = value;
        self
    }

    /// Declares a schema field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.schema.insert(name.into(), spec);
        self
    }

    /// Fields that need an index at creation, with their uniqueness flag.
    pub fn indexed_fields(&self) -> impl Iterator<Item = (&str, bool)> {
        self.schema.iter().filter_map(move |(name, spec)| {
            (spec.unique || (spec.indexed && self.auto_index))
                .then_some((name.as_str(), spec.unique))
        })
    }
}

/// Configuration for opening a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Storage engine settings.
    pub storage: StorageConfig,

    /// Creating a collection fails once this many exist.
    pub max_collections: Option<usize>,

    /// Keep mutations in memory until [`Database::flush`](crate::Database::flush).
    pub lazy_write: bool,

    /// Options for collections created implicitly.
    pub default_collection_options: CollectionOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            max_collections: None,
            lazy_write: false,
            default_collection_options: CollectionOptions::default(),
        }
    }
}

impl Config {
    /// Creates a configuration storing data under `base_path`.
    #[must_use]
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            storage: StorageConfig::new(base_path),
            ..Self::default()
        }
    }

    /// Sets the document encoding.
    #[must_use]
    pub fn format(mut self, format: StorageFormat) -> Self {
        self.storage.format = format;
        self
    }

    /// Sets the document encoding by name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown format names.
    pub fn format_name(mut self, name: &str) -> crate::CoreResult<Self> {
        self.storage = self
            .storage
            .format_name(name)
            .map_err(|err| crate::CoreError::configuration(err.to_string()))?;
        Ok(self)
    }

    /// Enables or disables gzip compression of document files.
    #[must_use]
    pub fn compression(mut self, value: bool) -> Self {
        self.storage.compression = value;
        self
    }

    /// Sets the collection limit.
    #[must_use]
    pub fn max_collections(mut self, limit: usize) -> Self {
        self.max_collections = Some(limit);
        self
    }

    /// Enables or disables lazy writes.
    #[must_use]
    pub fn lazy_write(mut self, value: bool) -> Self {
        self.lazy_write = value;
        self
    }

    /// Sets the options used for implicitly created collections.
    #[must_use]
    pub fn default_collection_options(mut self, options: CollectionOptions) -> Self {
        self.default_collection_options = options;
        self
    }
}
