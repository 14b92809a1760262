//! # DocuDB Storage
//!
//! File-per-document storage engine for DocuDB.
//!
//! This crate owns everything DocuDB puts on disk:
//!
//! ```text
//! <base>/collections/<name>/<id>.<ext>[.gz]
//! <base>/metadata/<name>.meta.json
//! <base>/indexes/<name>/<field>.idx
//! ```
//!
//! ## Design Principles
//!
//! - The engine knows nothing about queries or indexes; index files are
//!   opaque bytes handed in by the index manager
//! - Missing files are a normal outcome (`None`/`false`), not an error
//! - Checksum mismatches abort the read with a corruption error
//! - Every public operation is `async` and suspends only at file I/O
//!
//! ## Example
//!
//! ```no_run
//! # async fn demo() -> docudb_storage::StorageResult<()> {
//! use docudb_storage::{StorageConfig, StorageEngine};
//! use docudb_codec::StorageFormat;
//!
//! let engine = StorageEngine::new(
//!     StorageConfig::new("data").format(StorageFormat::Binary).compression(true),
//! );
//! engine.init().await?;
//! engine.backup("backups/today.json").await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backup;
mod config;
mod engine;
mod error;
pub mod layout;
mod metadata;

pub use backup::{
    BackupArchive, BackupKind, BackupMetadata, BackupSummary, RestoreReport, BACKUP_MANIFEST,
};
pub use config::StorageConfig;
pub use engine::{document_id, StorageEngine};
pub use error::{StorageError, StorageResult};
pub use layout::Layout;
pub use metadata::CollectionMetadata;
