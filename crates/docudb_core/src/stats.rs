//! Database statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = db.stats();
//! println!("{} documents in {} collections", stats.documents, stats.collections);
//! for c in &stats.per_collection {
//!     println!("{}: {} docs, {} indexes", c.name, c.documents, c.indexes);
//! }
//! ```

use serde::Serialize;

/// Counters for one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    /// Collection name.
    pub name: String,
    /// Documents held in memory.
    pub documents: usize,
    /// Indexes, including `_id`.
    pub indexes: usize,
    /// Mutations waiting for a lazy-write flush.
    pub pending_writes: usize,
}

/// A snapshot of database-wide counters.
///
/// Values are read collection by collection without a global lock, so
/// concurrent writes may make the totals slightly inconsistent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    /// Number of open collections.
    pub collections: usize,
    /// Total documents.
    pub documents: usize,
    /// Total indexes.
    pub indexes: usize,
    /// Per-collection breakdown, sorted by name.
    pub per_collection: Vec<CollectionStats>,
}

impl DatabaseStats {
    /// Builds totals from per-collection counters.
    pub fn from_collections(per_collection: Vec<CollectionStats>) -> Self {
        Self {
            collections: per_collection.len(),
            documents: per_collection.iter().map(|c| c.documents).sum(),
            indexes: per_collection.iter().map(|c| c.indexes).sum(),
            per_collection,
        }
    }

    /// Returns the counters of one collection.
    pub fn collection(&self, name: &str) -> Option<&CollectionStats> {
        self.per_collection.iter().find(|c| c.name == name)
    }
}
