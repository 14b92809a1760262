//! Collection handle.

use super::options::{DeleteOptions, DeleteResult, UpdateOptions, UpdateResult};
use crate::change_feed::{ChangeFeed, DatabaseEvent};
use crate::config::CollectionOptions;
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexManager, IndexStats};
use crate::query::{Filter, FindOptions, QueryEngine, QueryPlan};
use crate::stats::CollectionStats;
use crate::types::{generate_id, DocumentTable, CREATED_AT_FIELD, UPDATED_AT_FIELD};
use crate::update::UpdateSpec;
use docudb_codec::{documents_equal, timestamp_now, Document, ID_FIELD};
use docudb_storage::{layout::validate_name, StorageEngine};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Services shared by every collection of a database.
pub(crate) struct Context {
    pub(crate) storage: Arc<StorageEngine>,
    pub(crate) indexes: Arc<IndexManager>,
    pub(crate) query: QueryEngine,
    pub(crate) events: Arc<ChangeFeed>,
    pub(crate) lazy_write: bool,
}

impl Context {
    pub(crate) fn new(storage: Arc<StorageEngine>, lazy_write: bool) -> Self {
        let indexes = Arc::new(IndexManager::new(Arc::clone(&storage)));
        Self {
            query: QueryEngine::new(Arc::clone(&indexes)),
            storage,
            indexes,
            events: Arc::new(ChangeFeed::new()),
            lazy_write,
        }
    }
}

struct State {
    name: String,
    options: CollectionOptions,
    table: RwLock<DocumentTable>,
    /// Ids changed in memory but not yet written (lazy-write mode).
    pending: Mutex<BTreeSet<String>>,
}

/// A named set of documents.
///
/// `Collection` is a cheap, cloneable handle. All clones share the same
/// in-memory table, so a write through one is visible through the others.
///
/// # Example
///
/// ```rust,ignore
/// let users = db.collection("users").await?;
///
/// let id = users.insert(to_document(json!({"name": "Alice", "age": 30}))?).await?;
/// let adults = users.find(&json!({"age": {"$gte": 18}}), &FindOptions::new()).await?;
/// users
///     .update(&json!({"_id": id}), &json!({"$inc": {"age": 1}}), UpdateOptions::default())
///     .await?;
/// ```
///
/// Every mutation is written through to storage before it returns,
/// unless the database runs in lazy-write mode; see
/// [`Collection::flush`].
#[derive(Clone)]
pub struct Collection {
    state: Arc<State>,
    ctx: Arc<Context>,
}

impl Collection {
    /// Creates an empty collection and its indexes.
    pub(crate) async fn create(
        ctx: Arc<Context>,
        name: &str,
        options: CollectionOptions,
    ) -> CoreResult<Self> {
        ctx.storage.create_collection(name).await?;
        let collection = Self::with_table(ctx, name, options, DocumentTable::new());
        {
            let table = collection.state.table.read();
            collection
                .ctx
                .indexes
                .create_indexes(name, &collection.state.options, &table)?;
        }
        if !collection.ctx.lazy_write {
            collection.persist_all_indexes().await;
        }
        info!(collection = name, "collection created");
        Ok(collection)
    }

    /// Loads a stored collection's documents and indexes.
    pub(crate) async fn load(
        ctx: Arc<Context>,
        name: &str,
        options: CollectionOptions,
    ) -> CoreResult<Self> {
        let docs = ctx.storage.list_documents(name, None, 0).await?;
        let mut table = DocumentTable::with_capacity(docs.len());
        for doc in docs {
            let id = docudb_storage::document_id(&doc)?.to_string();
            table.insert(id, doc);
        }
        ctx.indexes.load_collection(name, &options, &table).await?;
        debug!(collection = name, documents = table.len(), "collection loaded");
        Ok(Self::with_table(ctx, name, options, table))
    }

    fn with_table(
        ctx: Arc<Context>,
        name: &str,
        options: CollectionOptions,
        table: DocumentTable,
    ) -> Self {
        Self {
            state: Arc::new(State {
                name: name.to_string(),
                options,
                table: RwLock::new(table),
                pending: Mutex::new(BTreeSet::new()),
            }),
            ctx,
        }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Returns the options the collection was opened with.
    pub fn options(&self) -> &CollectionOptions {
        &self.state.options
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.state.table.read().len()
    }

    /// Returns true if the collection holds no documents.
    pub fn is_empty(&self) -> bool {
        self.state.table.read().is_empty()
    }

    /// Returns the collection's counters.
    pub fn stats(&self) -> CollectionStats {
        CollectionStats {
            name: self.name().to_string(),
            documents: self.len(),
            indexes: self.ctx.indexes.list_indexes(self.name()).len(),
            pending_writes: self.state.pending.lock().len(),
        }
    }

    /// Inserts a document and returns its id.
    ///
    /// A missing `_id` is generated. `_createdAt` and `_updatedAt` are
    /// stamped with the current time.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidDocument`] for a non-string `_id`
    /// - [`CoreError::Capacity`] once `max_documents` is reached
    /// - [`CoreError::Uniqueness`] for a taken `_id` or unique value
    /// - storage errors from the file write, after which the insert is
    ///   rolled back
    pub async fn insert(&self, mut doc: Document) -> CoreResult<String> {
        let id = match doc.get(ID_FIELD) {
            None => generate_id(),
            Some(Value::String(id)) => id.clone(),
            Some(other) => {
                return Err(CoreError::invalid_document(format!(
                    "_id must be a string, found {other}"
                )))
            }
        };
        validate_name("document", &id)?;

        let now = Value::String(timestamp_now());
        doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        doc.insert(CREATED_AT_FIELD.to_string(), now.clone());
        doc.insert(UPDATED_AT_FIELD.to_string(), now);

        let name = self.name();
        let touched = {
            let mut table = self.state.table.write();
            if let Some(limit) = self.state.options.max_documents {
                if table.len() >= limit {
                    return Err(CoreError::capacity(format!(
                        "collection '{name}' is limited to {limit} documents"
                    )));
                }
            }
            if table.contains_key(&id) {
                return Err(CoreError::uniqueness(name, ID_FIELD, &Value::String(id)));
            }
            let touched = self.ctx.indexes.add_document(name, &id, &doc)?;
            table.insert(id.clone(), doc.clone());
            touched
        };

        if self.ctx.lazy_write {
            self.state.pending.lock().insert(id.clone());
        } else {
            if let Err(err) = self.ctx.storage.insert(name, &doc).await {
                let mut table = self.state.table.write();
                // A concurrent mutation owns the entry now; leave it alone.
                if table.get(&id).is_some_and(|current| documents_equal(current, &doc)) {
                    table.shift_remove(&id);
                    self.ctx.indexes.remove_document(name, &id, &doc);
                }
                return Err(err.into());
            }
            self.persist_indexes(&touched).await;
        }

        self.ctx.events.emit(DatabaseEvent::DocumentInserted {
            collection: name.to_string(),
            id: id.clone(),
        });
        Ok(id)
    }

    /// Inserts documents one by one and returns their ids in order.
    ///
    /// Stops at the first failure; documents inserted before it stay.
    pub async fn insert_many(&self, docs: Vec<Document>) -> CoreResult<Vec<String>> {
        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            ids.push(self.insert(doc).await?);
        }
        Ok(ids)
    }

    /// Finds matching documents.
    ///
    /// `filter` uses the operator syntax described in [`crate::query`].
    pub async fn find(&self, filter: &Value, options: &FindOptions) -> CoreResult<Vec<Document>> {
        let filter = Filter::parse(filter)?;
        let table = self.state.table.read();
        Ok(self.ctx.query.find(self.name(), &table, &filter, options))
    }

    /// Finds the first matching document in sort order.
    pub async fn find_one(
        &self,
        filter: &Value,
        options: &FindOptions,
    ) -> CoreResult<Option<Document>> {
        let options = FindOptions {
            limit: Some(1),
            ..options.clone()
        };
        Ok(self.find(filter, &options).await?.into_iter().next())
    }

    /// Looks up a document by id.
    pub async fn find_by_id(&self, id: &str) -> CoreResult<Option<Document>> {
        Ok(self.state.table.read().get(id).cloned())
    }

    /// Counts matching documents.
    pub async fn count(&self, filter: &Value) -> CoreResult<usize> {
        let filter = Filter::parse(filter)?;
        let table = self.state.table.read();
        Ok(self.ctx.query.count(self.name(), &table, &filter))
    }

    /// Distinct values of `field` among matching documents.
    pub async fn distinct(&self, field: &str, filter: &Value) -> CoreResult<Vec<Value>> {
        let filter = Filter::parse(filter)?;
        let table = self.state.table.read();
        Ok(self.ctx.query.distinct(self.name(), &table, field, &filter))
    }

    /// Describes how `filter` would be executed.
    pub fn explain(&self, filter: &Value) -> CoreResult<QueryPlan> {
        let filter = Filter::parse(filter)?;
        Ok(self.ctx.query.plan(self.name(), &filter))
    }

    /// Applies `update` to matching documents.
    ///
    /// Documents whose contents do not change count as matched but not
    /// modified and are not rewritten. Zero matches is not an error.
    ///
    /// # Errors
    ///
    /// Filter and update parse errors abort before anything changes. A
    /// failure on one document (uniqueness, invalid update, storage)
    /// returns the error; documents updated before it stay updated.
    pub async fn update(
        &self,
        filter: &Value,
        update: &Value,
        options: UpdateOptions,
    ) -> CoreResult<UpdateResult> {
        let filter = Filter::parse(filter)?;
        let spec = UpdateSpec::parse(update)?;
        let name = self.name();

        let ids = self.matching_ids(&filter, options.limit);
        let mut result = UpdateResult::default();
        let mut modified = Vec::new();

        for id in ids {
            // Read, re-check and replace under one write lock so the index
            // change is computed from the document it actually replaces.
            let (old, new, touched) = {
                let mut table = self.state.table.write();
                let Some(old) = table.get(&id) else {
                    continue;
                };
                if !filter.matches(old) {
                    continue;
                }
                result.matched += 1;

                let mut new = spec.apply(old)?;
                if documents_equal(old, &new) {
                    continue;
                }
                new.insert(
                    UPDATED_AT_FIELD.to_string(),
                    Value::String(timestamp_now()),
                );
                let old = old.clone();
                let touched = self.ctx.indexes.update_document(name, &id, &old, &new)?;
                table.insert(id.clone(), new.clone());
                (old, new, touched)
            };

            if self.ctx.lazy_write {
                self.state.pending.lock().insert(id.clone());
            } else {
                if let Err(err) = self.ctx.storage.update(name, &new).await {
                    self.restore_document(&id, &new, old);
                    return Err(err.into());
                }
                self.persist_indexes(&touched).await;
            }
            result.modified += 1;
            modified.push(id);
        }

        if !modified.is_empty() {
            self.ctx.events.emit(DatabaseEvent::DocumentsUpdated {
                collection: name.to_string(),
                ids: modified,
            });
        }
        Ok(result)
    }

    /// Updates at most one matching document.
    pub async fn update_one(&self, filter: &Value, update: &Value) -> CoreResult<UpdateResult> {
        self.update(filter, update, UpdateOptions::limit(1)).await
    }

    /// Deletes matching documents. Zero matches is not an error.
    pub async fn delete(&self, filter: &Value, options: DeleteOptions) -> CoreResult<DeleteResult> {
        let filter = Filter::parse(filter)?;
        let name = self.name();
        let ids = self.matching_ids(&filter, options.limit);

        let mut deleted = Vec::new();
        for id in ids {
            let removed = {
                let mut table = self.state.table.write();
                match table.shift_remove_full(&id) {
                    Some((position, _, doc)) => {
                        let touched = self.ctx.indexes.remove_document(name, &id, &doc);
                        Some((position, doc, touched))
                    }
                    None => None,
                }
            };
            let Some((position, doc, touched)) = removed else {
                continue;
            };

            if self.ctx.lazy_write {
                self.state.pending.lock().insert(id.clone());
            } else {
                if let Err(err) = self.ctx.storage.delete(name, &id).await {
                    self.restore_deleted(position, id, doc);
                    return Err(err.into());
                }
                self.persist_indexes(&touched).await;
            }
            deleted.push(id);
        }

        let result = DeleteResult {
            deleted: deleted.len(),
        };
        if !deleted.is_empty() {
            self.ctx.events.emit(DatabaseEvent::DocumentsDeleted {
                collection: name.to_string(),
                ids: deleted,
            });
        }
        Ok(result)
    }

    /// Deletes at most one matching document.
    pub async fn delete_one(&self, filter: &Value) -> CoreResult<DeleteResult> {
        self.delete(filter, DeleteOptions::limit(1)).await
    }

    /// Builds an index on `field` over the current documents.
    ///
    /// Returns false if an identical index already exists.
    pub async fn create_index(&self, field: &str, unique: bool) -> CoreResult<bool> {
        let created = {
            let table = self.state.table.read();
            self.ctx
                .indexes
                .create_index(self.name(), field, unique, &table)?
        };
        if !created {
            return Ok(false);
        }
        if !self.ctx.lazy_write {
            self.ctx
                .indexes
                .persist(self.name(), &[field.to_string()])
                .await?;
        }
        info!(collection = self.name(), field, unique, "index created");
        self.ctx.events.emit(DatabaseEvent::IndexCreated {
            collection: self.name().to_string(),
            field: field.to_string(),
            unique,
        });
        Ok(true)
    }

    /// Drops the index on `field`. Returns false if none existed.
    pub async fn drop_index(&self, field: &str) -> CoreResult<bool> {
        let dropped = self.ctx.indexes.drop_index(self.name(), field).await?;
        if dropped {
            self.ctx.events.emit(DatabaseEvent::IndexDropped {
                collection: self.name().to_string(),
                field: field.to_string(),
            });
        }
        Ok(dropped)
    }

    /// Summaries of the collection's indexes.
    pub fn list_indexes(&self) -> Vec<IndexStats> {
        self.ctx.indexes.list_indexes(self.name())
    }

    /// Rebuilds every index from the in-memory documents.
    pub async fn rebuild_indexes(&self) -> CoreResult<()> {
        {
            let table = self.state.table.read();
            self.ctx.indexes.rebuild(self.name(), &table)?;
        }
        self.ctx.indexes.persist_collection(self.name()).await
    }

    /// Writes documents and indexes deferred by lazy-write mode.
    ///
    /// Returns the number of documents written or deleted. Ids that could
    /// not be written stay pending.
    pub async fn flush(&self) -> CoreResult<usize> {
        let pending: Vec<String> = std::mem::take(&mut *self.state.pending.lock())
            .into_iter()
            .collect();
        let name = self.name();

        for (done, id) in pending.iter().enumerate() {
            let doc = self.state.table.read().get(id).cloned();
            let written = match doc {
                Some(doc) => self.ctx.storage.update(name, &doc).await.map(|()| true),
                None => self.ctx.storage.delete(name, id).await,
            };
            if let Err(err) = written {
                self.state
                    .pending
                    .lock()
                    .extend(pending[done..].iter().cloned());
                return Err(err.into());
            }
        }

        self.ctx.indexes.persist_collection(name).await?;
        if !pending.is_empty() {
            debug!(collection = name, documents = pending.len(), "collection flushed");
        }
        Ok(pending.len())
    }

    /// Removes every document, index and file of the collection.
    ///
    /// The handle stays usable and starts over empty, with the `_id` index
    /// and schema indexes in place.
    pub async fn drop(&self) -> CoreResult<()> {
        let name = self.name();
        {
            let mut table = self.state.table.write();
            table.clear();
            self.state.pending.lock().clear();
            self.ctx.indexes.drop_collection(name);
            self.ctx
                .indexes
                .create_indexes(name, &self.state.options, &table)?;
        }
        self.ctx.storage.drop_collection(name).await?;
        info!(collection = name, "collection dropped");
        self.ctx.events.emit(DatabaseEvent::CollectionDropped {
            collection: name.to_string(),
        });
        Ok(())
    }

    /// Replaces the in-memory state with what storage holds.
    pub(crate) async fn reload(&self) -> CoreResult<()> {
        let name = self.name();
        let docs = self.ctx.storage.list_documents(name, None, 0).await?;
        let mut table = DocumentTable::with_capacity(docs.len());
        for doc in docs {
            let id = docudb_storage::document_id(&doc)?.to_string();
            table.insert(id, doc);
        }
        self.ctx.indexes.rebuild(name, &table)?;
        *self.state.table.write() = table;
        self.state.pending.lock().clear();
        self.ctx.indexes.persist_collection(name).await
    }

    fn matching_ids(&self, filter: &Filter, limit: Option<usize>) -> Vec<String> {
        let table = self.state.table.read();
        let mut ids = self.ctx.query.matching_ids(self.name(), &table, filter);
        if let Some(limit) = limit {
            ids.truncate(limit);
        }
        ids
    }

    /// Undoes an in-memory update whose file write failed.
    fn restore_document(&self, id: &str, current: &Document, previous: Document) {
        let name = self.name();
        let mut table = self.state.table.write();
        if !table.get(id).is_some_and(|doc| documents_equal(doc, current)) {
            warn!(
                collection = name,
                id,
                "document changed concurrently, update not rolled back"
            );
            return;
        }
        if let Err(err) = self.ctx.indexes.update_document(name, id, current, &previous) {
            warn!(collection = name, id, error = %err, "index rollback failed");
            return;
        }
        table.insert(id.to_string(), previous);
    }

    /// Puts back a document whose file delete failed.
    fn restore_deleted(&self, position: usize, id: String, doc: Document) {
        let name = self.name();
        let mut table = self.state.table.write();
        if table.contains_key(&id) {
            warn!(
                collection = name,
                id = %id,
                "document re-created concurrently, delete not rolled back"
            );
            return;
        }
        if let Err(err) = self.ctx.indexes.add_document(name, &id, &doc) {
            warn!(collection = name, id = %id, error = %err, "index rollback failed");
            return;
        }
        let position = position.min(table.len());
        table.shift_insert(position, id, doc);
    }

    /// Index files lag behind after a failure here; load and
    /// `rebuild_indexes` repair them.
    async fn persist_indexes(&self, fields: &[String]) {
        if fields.is_empty() {
            return;
        }
        if let Err(err) = self.ctx.indexes.persist(self.name(), fields).await {
            warn!(collection = self.name(), error = %err, "failed to persist index files");
        }
    }

    async fn persist_all_indexes(&self) {
        if let Err(err) = self.ctx.indexes.persist_collection(self.name()).await {
            warn!(collection = self.name(), error = %err, "failed to persist index files");
        }
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.state.name)
            .field("documents", &self.len())
            .finish()
    }
}
