//! Test fixtures and database helpers.
//!
//! Provides temporary databases and seed data for common test scenarios.

use docudb_codec::Document;
use docudb_core::{to_document, Config, Database};
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

/// A database rooted in a temporary directory that is removed on drop.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    config: Config,
    dir: TempDir,
}

impl TestDatabase {
    /// Opens a database with the default configuration.
    pub async fn open() -> Self {
        Self::open_with(|config| config).await
    }

    /// Opens a database whose configuration is adjusted by `configure`.
    ///
    /// The base path is always the temporary directory.
    pub async fn open_with(configure: impl FnOnce(Config) -> Config) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let mut config = configure(Config::new(dir.path()));
        config.storage.base_path = dir.path().to_path_buf();
        let db = Database::open(config.clone())
            .await
            .expect("Failed to open test database");
        Self { db, config, dir }
    }

    /// Closes the database and opens it again from disk.
    ///
    /// Lazy writes that were never flushed are lost, as they would be
    /// after a crash.
    pub async fn reopen(self) -> Self {
        let Self { db, config, dir } = self;
        drop(db);
        let db = Database::open(config.clone())
            .await
            .expect("Failed to reopen test database");
        Self { db, config, dir }
    }

    /// Returns the storage root.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the configuration the database was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Converts a JSON object literal into a document.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn document(value: Value) -> Document {
    to_document(value).expect("Test document must be a JSON object")
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use docudb_core::Collection;
    use serde_json::json;

    /// Inserts four users, three of them adults, and returns their ids
    /// in insertion order.
    pub async fn seed_users(collection: &Collection) -> Vec<String> {
        let users = [
            json!({
                "name": "Alice",
                "email": "alice@example.com",
                "age": 30,
                "tags": ["admin", "ops"]
            }),
            json!({"name": "Bob", "email": "bob@example.com", "age": 17, "tags": []}),
            json!({"name": "Carol", "email": "carol@example.com", "age": 45, "tags": ["ops"]}),
            json!({"name": "Dave", "email": "dave@example.com", "age": 22}),
        ];
        let mut ids = Vec::with_capacity(users.len());
        for user in users {
            ids.push(
                collection
                    .insert(document(user))
                    .await
                    .expect("Failed to insert user"),
            );
        }
        ids
    }

    /// Inserts `count` documents `{"n": i, "parity": "even"|"odd"}`.
    pub async fn seed_numbers(collection: &Collection, count: usize) -> Vec<String> {
        let mut ids = Vec::with_capacity(count);
        for n in 0..count {
            let parity = if n % 2 == 0 { "even" } else { "odd" };
            ids.push(
                collection
                    .insert(document(json!({"n": n, "parity": parity})))
                    .await
                    .expect("Failed to insert number"),
            );
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_open_creates_layout() {
        let db = TestDatabase::open().await;
        assert!(db.path().join("collections").is_dir());
        assert!(db.list_collections().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_keeps_documents() {
        let db = TestDatabase::open().await;
        let users = db.collection("users").await.unwrap();
        let ids = scenarios::seed_users(&users).await;

        let db = db.reopen().await;
        let users = db.get_collection("users").expect("collection reloaded");
        assert_eq!(users.len(), 4);
        let alice = users.find_by_id(&ids[0]).await.unwrap().unwrap();
        assert_eq!(alice["name"], json!("Alice"));
    }

    #[tokio::test]
    async fn test_open_with_overrides_config() {
        let db = TestDatabase::open_with(|config| config.lazy_write(true)).await;
        assert!(db.config().lazy_write);
        assert_eq!(db.config().storage.base_path, db.path());
    }

    #[test]
    #[should_panic]
    fn test_document_rejects_non_objects() {
        document(json!([1, 2]));
    }
}
