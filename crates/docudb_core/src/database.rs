//! Database facade.

use crate::change_feed::{ChangeEvent, ChangeFeed, DatabaseEvent};
use crate::collection::{Collection, Context};
use crate::config::{CollectionOptions, Config};
use crate::error::{CoreError, CoreResult};
use crate::stats::DatabaseStats;
use docudb_storage::{layout::validate_name, BackupSummary, RestoreReport, StorageEngine};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::info;

/// The main database handle.
///
/// `Database` is the entry point for DocuDB. It provides:
/// - Collection management (get-or-create, drop, listing)
/// - Backup and restore
/// - Lazy-write flushing
/// - The change feed
///
/// # Opening a Database
///
/// ```rust,ignore
/// use docudb_core::{Config, Database};
/// use docudb_codec::StorageFormat;
///
/// let db = Database::open(
///     Config::new("data").format(StorageFormat::Binary).compression(true),
/// )
/// .await?;
///
/// let users = db.collection("users").await?;
/// users.create_index("email", true).await?;
/// ```
///
/// Opening loads every stored collection into memory and loads or
/// rebuilds its indexes.
pub struct Database {
    config: Config,
    ctx: Arc<Context>,
    collections: RwLock<BTreeMap<String, Collection>>,
    /// Serializes collection creation across suspension points.
    create_lock: tokio::sync::Mutex<()>,
}

impl Database {
    /// Opens (or initializes) the database described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage layout cannot be created or a
    /// stored document fails to decode.
    pub async fn open(config: Config) -> CoreResult<Self> {
        let storage = Arc::new(StorageEngine::new(config.storage.clone()));
        storage.init().await?;
        let ctx = Arc::new(Context::new(Arc::clone(&storage), config.lazy_write));

        let mut collections = BTreeMap::new();
        for name in storage.list_collections().await? {
            let collection = Collection::load(
                Arc::clone(&ctx),
                &name,
                config.default_collection_options.clone(),
            )
            .await?;
            collections.insert(name, collection);
        }

        info!(
            path = %config.storage.base_path.display(),
            format = %config.storage.format,
            collections = collections.len(),
            "database opened"
        );
        Ok(Self {
            config,
            ctx,
            collections: RwLock::new(collections),
            create_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the storage engine.
    pub fn storage(&self) -> &StorageEngine {
        &self.ctx.storage
    }

    /// Returns the collection, creating it with the default options if
    /// it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a capacity error when creating would exceed
    /// `max_collections`.
    pub async fn collection(&self, name: &str) -> CoreResult<Collection> {
        if let Some(collection) = self.get_collection(name) {
            return Ok(collection);
        }
        let _guard = self.create_lock.lock().await;
        if let Some(collection) = self.get_collection(name) {
            return Ok(collection);
        }
        self.create_locked(name, self.config.default_collection_options.clone())
            .await
    }

    /// Creates a collection with explicit options.
    ///
    /// # Errors
    ///
    /// Fails if the collection already exists or `max_collections` is
    /// reached.
    pub async fn create_collection(
        &self,
        name: &str,
        options: CollectionOptions,
    ) -> CoreResult<Collection> {
        let _guard = self.create_lock.lock().await;
        if self.get_collection(name).is_some() {
            return Err(CoreError::invalid_operation(format!(
                "collection '{name}' already exists"
            )));
        }
        self.create_locked(name, options).await
    }

    async fn create_locked(
        &self,
        name: &str,
        options: CollectionOptions,
    ) -> CoreResult<Collection> {
        validate_name("collection", name)?;
        if let Some(limit) = self.config.max_collections {
            if self.collections.read().len() >= limit {
                return Err(CoreError::capacity(format!(
                    "database is limited to {limit} collections"
                )));
            }
        }

        let collection = Collection::create(Arc::clone(&self.ctx), name, options).await?;
        self.collections
            .write()
            .insert(name.to_string(), collection.clone());
        self.ctx.events.emit(DatabaseEvent::CollectionCreated {
            collection: name.to_string(),
        });
        Ok(collection)
    }

    /// Returns an existing collection.
    pub fn get_collection(&self, name: &str) -> Option<Collection> {
        self.collections.read().get(name).cloned()
    }

    /// Names of all collections, sorted.
    pub fn list_collections(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    /// Drops a collection with its documents, indexes and files.
    ///
    /// Returns false if no such collection exists. Handles obtained
    /// earlier see an empty collection.
    pub async fn drop_collection(&self, name: &str) -> CoreResult<bool> {
        let Some(collection) = self.collections.write().remove(name) else {
            return Ok(false);
        };
        collection.drop().await?;
        self.ctx.indexes.drop_collection(name);
        Ok(true)
    }

    /// Writes everything deferred by lazy-write mode.
    ///
    /// Returns the number of documents written or deleted.
    pub async fn flush(&self) -> CoreResult<usize> {
        let collections: Vec<Collection> = self.collections.read().values().cloned().collect();
        let mut flushed = 0;
        for collection in collections {
            flushed += collection.flush().await?;
        }
        Ok(flushed)
    }

    /// Backs up all stored data to `path`.
    ///
    /// A path ending in `.json` produces a single archive file; any other
    /// path produces a mirrored directory. Pending lazy writes are flushed
    /// first. Writes running concurrently may or may not be included.
    pub async fn backup(&self, path: impl AsRef<Path>) -> CoreResult<BackupSummary> {
        self.flush().await?;
        Ok(self.ctx.storage.backup(path).await?)
    }

    /// Restores a backup written by [`Database::backup`].
    ///
    /// Restored documents are written over existing ones with the same
    /// id; other documents are kept. Affected collections are reloaded
    /// and their indexes rebuilt.
    pub async fn restore(&self, path: impl AsRef<Path>) -> CoreResult<RestoreReport> {
        let report = self.ctx.storage.restore(path).await?;
        for name in &report.collections {
            match self.get_collection(name) {
                Some(collection) => collection.reload().await?,
                None => {
                    let collection = Collection::load(
                        Arc::clone(&self.ctx),
                        name,
                        self.config.default_collection_options.clone(),
                    )
                    .await?;
                    collection.rebuild_indexes().await?;
                    self.collections.write().insert(name.clone(), collection);
                    self.ctx.events.emit(DatabaseEvent::CollectionCreated {
                        collection: name.clone(),
                    });
                }
            }
        }
        info!(
            collections = report.collections.len(),
            documents = report.documents,
            "restore complete"
        );
        Ok(report)
    }

    /// Subscribes to the change feed.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.ctx.events.subscribe()
    }

    /// Returns the change feed.
    pub fn change_feed(&self) -> &ChangeFeed {
        &self.ctx.events
    }

    /// Returns a snapshot of database counters.
    pub fn stats(&self) -> DatabaseStats {
        let per_collection = self
            .collections
            .read()
            .values()
            .map(Collection::stats)
            .collect();
        DatabaseStats::from_collections(per_collection)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("base_path", &self.config.storage.base_path)
            .field("collections", &self.list_collections())
            .finish()
    }
}
