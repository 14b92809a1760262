//! Collections.
//!
//! A [`Collection`] is the document-store API: inserts, queries, updates,
//! deletes and index management over one named set of documents.
//! [`TypedCollection`] layers serde conversion on top.

mod handle;
mod options;
mod typed;

pub(crate) use handle::Context;
pub use handle::Collection;
pub use options::{DeleteOptions, DeleteResult, UpdateOptions, UpdateResult};
pub use typed::TypedCollection;
