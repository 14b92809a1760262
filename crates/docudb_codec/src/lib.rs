//! # DocuDB Codec
//!
//! Document model and on-disk encodings for DocuDB.
//!
//! This crate provides:
//! - The [`Document`] type and value ordering/equality rules
//! - Index key normalization ([`normalize_key`] / [`denormalize_key`])
//! - The `json`, `binary` and `hybrid` encodings, with optional gzip
//! - SHA-256 checksum frames that turn silent corruption into errors
//!
//! ## Usage
//!
//! ```
//! use docudb_codec::{Document, DocumentCodec, StorageFormat};
//! use serde_json::json;
//!
//! let mut doc = Document::new();
//! doc.insert("_id".into(), json!("a1"));
//! doc.insert("name".into(), json!("Alice"));
//!
//! let codec = DocumentCodec::new(StorageFormat::Binary, true);
//! let bytes = codec.encode(&doc).unwrap();
//! assert_eq!(codec.decode(&bytes).unwrap(), doc);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod checksum;
mod error;
mod format;
pub mod frame;
mod value;

pub use error::{CodecError, CodecResult};
pub use format::{
    gunzip, gzip, DocumentCodec, StorageFormat, UnknownFormat, GZIP_SUFFIX,
    HYBRID_SPLIT_THRESHOLD,
};
pub use value::{
    as_date, canonical_json, compare_optional, compare_values, date_value, denormalize_key,
    documents_equal, get_path, normalize_key, remove_path, set_path, timestamp_now,
    values_equal, Document, ValueType, DATE_KEY, ID_FIELD,
};
