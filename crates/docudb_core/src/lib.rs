//! # DocuDB Core
//!
//! Embedded document database engine.
//!
//! This crate provides:
//! - [`Database`]: opens a storage root, owns collections, backup/restore
//! - [`Collection`]: insert, query, update and delete documents
//! - Field indexes with uniqueness enforcement ([`index`])
//! - A MongoDB-style filter language ([`query`])
//! - Update operators (`$set`, `$unset`, `$inc`, `$push`, `$pull`)
//! - A change feed of completed operations
//!
//! ## Example
//!
//! ```no_run
//! # async fn demo() -> docudb_core::CoreResult<()> {
//! use docudb_core::{to_document, Config, Database, FindOptions, SortKey};
//! use serde_json::json;
//!
//! let db = Database::open(Config::new("data")).await?;
//! let users = db.collection("users").await?;
//! users.create_index("email", true).await?;
//!
//! users.insert(to_document(json!({"name": "Ann", "email": "ann@x.com", "age": 31}))?).await?;
//!
//! let adults = users
//!     .find(
//!         &json!({"age": {"$gte": 18}}),
//!         &FindOptions::new().sort(SortKey::desc("age")).limit(10),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod collection;
mod config;
mod database;
mod error;
pub mod index;
pub mod query;
mod stats;
mod types;
mod update;

pub use change_feed::{ChangeEvent, ChangeFeed, DatabaseEvent};
pub use collection::{
    Collection, DeleteOptions, DeleteResult, TypedCollection, UpdateOptions, UpdateResult,
};
pub use config::{CollectionOptions, Config, FieldSpec, Schema};
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use index::{FieldIndex, IndexManager, IndexStats};
pub use query::{FindOptions, Projection, QueryError, QueryPlan, SortKey, SortOrder};
pub use stats::{CollectionStats, DatabaseStats};
pub use types::{
    generate_id, id_of, to_document, DocumentTable, CREATED_AT_FIELD, UPDATED_AT_FIELD,
};
pub use update::UpdateSpec;

pub use docudb_codec::{Document, StorageFormat};
pub use docudb_storage::{BackupSummary, RestoreReport, StorageConfig};
