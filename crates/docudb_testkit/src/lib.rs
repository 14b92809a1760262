//! # DocuDB Testkit
//!
//! Test utilities for DocuDB.
//!
//! This crate provides:
//! - Temporary databases that clean up after themselves ([`TestDatabase`])
//! - Seed data for common scenarios ([`scenarios`])
//! - Property-based generators for documents and filters ([`generators`])
//! - Cross-crate integration tests exercising codec, storage and core together
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docudb_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn finds_adults() {
//!     let db = TestDatabase::open().await;
//!     let users = db.collection("users").await.unwrap();
//!     scenarios::seed_users(&users).await;
//!     assert_eq!(users.count(&json!({"age": {"$gte": 18}})).await.unwrap(), 3);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use serde_json::json;
}

pub use fixtures::*;
pub use generators::*;
