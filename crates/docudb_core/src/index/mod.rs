//! Field indexes.
//!
//! Indexes are access paths that speed up equality and range lookups and
//! enforce uniqueness. They are:
//! - Declared per collection, by schema or explicit `create_index`
//! - Maintained alongside every document mutation
//! - Fully derivable from the documents
//!
//! # Warning
//!
//! Callers never name an index in a query. The query engine consults the
//! [`IndexManager`] and falls back to a full scan.

mod field;
mod manager;

pub use field::{FieldIndex, IndexStats};
pub use manager::{IndexManager, IndexScan};
