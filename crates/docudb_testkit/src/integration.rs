//! Cross-crate integration tests.
//!
//! These exercise codec, storage and core together through the public
//! `Database` API, reopening databases from disk where persistence is
//! part of the property under test.
