//! Index manager - per-collection index bookkeeping.
//!
//! The manager owns every [`FieldIndex`] of every open collection and:
//!
//! 1. Mirrors document mutations into the relevant indexes
//! 2. Checks uniqueness before a mutation touches any index
//! 3. Answers single-field lookups for the query engine
//! 4. Loads index files at open and writes them back after mutations
//!
//! Indexes are an access path, never the source of truth: a missing,
//! damaged or inconsistent index file is rebuilt from the documents.
//!
//! Locks are only held between suspension points. Persisting an index
//! serializes it under the lock and writes the bytes afterwards.

use super::field::{FieldIndex, IndexStats};
use crate::config::CollectionOptions;
use crate::error::{CoreError, CoreResult};
use crate::query::{Condition, Filter};
use crate::types::DocumentTable;
use docudb_codec::{get_path, normalize_key, Document, ID_FIELD};
use docudb_storage::StorageEngine;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Indexes of one collection, in creation order.
type CollectionIndexes = IndexMap<String, FieldIndex>;

/// Candidate ids produced by an index lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexScan {
    /// Field whose index answered the lookup.
    pub field: String,
    /// Ids that may match; callers re-check the full filter.
    pub ids: Vec<String>,
}

/// Owns the field indexes of all collections.
pub struct IndexManager {
    storage: Arc<StorageEngine>,
    collections: RwLock<HashMap<String, CollectionIndexes>>,
}

impl IndexManager {
    /// Creates a manager persisting through `storage`.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self {
            storage,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Builds the indexes a new collection needs: the mandatory unique
    /// `_id` index plus every indexed field of the schema.
    ///
    /// Existing indexes are kept.
    pub fn create_indexes(
        &self,
        collection: &str,
        options: &CollectionOptions,
        table: &DocumentTable,
    ) -> CoreResult<Vec<String>> {
        let mut created = Vec::new();
        if self.create_index(collection, ID_FIELD, true, table)? {
            created.push(ID_FIELD.to_string());
        }
        for (field, unique) in options.indexed_fields() {
            if self.create_index(collection, field, unique, table)? {
                created.push(field.to_string());
            }
        }
        Ok(created)
    }

    /// Builds an index over the current documents.
    ///
    /// Returns false if an index on `field` already exists with the same
    /// uniqueness.
    ///
    /// # Errors
    ///
    /// Fails with a uniqueness error when a unique index cannot be built
    /// over the existing documents; nothing is registered in that case.
    pub fn create_index(
        &self,
        collection: &str,
        field: &str,
        unique: bool,
        table: &DocumentTable,
    ) -> CoreResult<bool> {
        if let Some(existing) = self.collections.read().get(collection).and_then(|c| c.get(field))
        {
            if existing.is_unique() == unique {
                return Ok(false);
            }
            return Err(CoreError::invalid_operation(format!(
                "index on '{field}' in '{collection}' already exists with unique={}",
                existing.is_unique()
            )));
        }

        let index = build_index(collection, field, unique, table)?;
        debug!(collection, field, unique, entries = index.size(), "index built");
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(field.to_string(), index);
        Ok(true)
    }

    /// Removes an index and its file.
    ///
    /// Returns false if no such index existed.
    ///
    /// # Errors
    ///
    /// The `_id` index cannot be dropped.
    pub async fn drop_index(&self, collection: &str, field: &str) -> CoreResult<bool> {
        if field == ID_FIELD {
            return Err(CoreError::invalid_operation("the _id index cannot be dropped"));
        }
        let removed = self
            .collections
            .write()
            .get_mut(collection)
            .and_then(|indexes| indexes.shift_remove(field))
            .is_some();
        if removed {
            self.storage.delete_index_file(collection, field).await?;
            debug!(collection, field, "index dropped");
        }
        Ok(removed)
    }

    /// Returns true if `field` is indexed in `collection`.
    pub fn has_index(&self, collection: &str, field: &str) -> bool {
        self.collections
            .read()
            .get(collection)
            .is_some_and(|indexes| indexes.contains_key(field))
    }

    /// Summaries of a collection's indexes, in creation order.
    pub fn list_indexes(&self, collection: &str) -> Vec<IndexStats> {
        self.collections
            .read()
            .get(collection)
            .map(|indexes| indexes.values().map(FieldIndex::stats).collect())
            .unwrap_or_default()
    }

    /// Total number of indexes across collections.
    pub fn index_count(&self) -> usize {
        self.collections.read().values().map(IndexMap::len).sum()
    }

    /// Fails if adding `doc` under `id` would violate a unique index.
    pub fn check_unique(&self, collection: &str, id: &str, doc: &Document) -> CoreResult<()> {
        let guard = self.collections.read();
        let Some(indexes) = guard.get(collection) else {
            return Ok(());
        };
        check_unique(collection, indexes, id, doc)
    }

    /// Adds a document to every index of its collection.
    ///
    /// Uniqueness is checked against all indexes before any is touched,
    /// so a failed add leaves every index unchanged. Returns the fields
    /// whose index changed.
    pub fn add_document(
        &self,
        collection: &str,
        id: &str,
        doc: &Document,
    ) -> CoreResult<Vec<String>> {
        let mut guard = self.collections.write();
        let Some(indexes) = guard.get_mut(collection) else {
            return Ok(Vec::new());
        };
        check_unique(collection, indexes, id, doc)?;

        let mut touched = Vec::new();
        for (field, index) in indexes.iter_mut() {
            if index.add_document(id, doc)? {
                touched.push(field.clone());
            }
        }
        Ok(touched)
    }

    /// Removes a document from every index of its collection.
    pub fn remove_document(&self, collection: &str, id: &str, doc: &Document) -> Vec<String> {
        let mut guard = self.collections.write();
        let Some(indexes) = guard.get_mut(collection) else {
            return Vec::new();
        };
        indexes
            .iter_mut()
            .filter_map(|(field, index)| index.remove_document(id, doc).then(|| field.clone()))
            .collect()
    }

    /// Moves a document from its old indexed values to its new ones.
    ///
    /// Only indexes whose value changed are touched. Uniqueness of the new
    /// values is checked first; on failure no index is modified.
    pub fn update_document(
        &self,
        collection: &str,
        id: &str,
        old: &Document,
        new: &Document,
    ) -> CoreResult<Vec<String>> {
        let mut guard = self.collections.write();
        let Some(indexes) = guard.get_mut(collection) else {
            return Ok(Vec::new());
        };

        let changed: Vec<String> = indexes
            .keys()
            .filter(|field| {
                let before = get_path(old, field).map(normalize_key);
                let after = get_path(new, field).map(normalize_key);
                before != after
            })
            .cloned()
            .collect();

        for field in &changed {
            if let (Some(index), Some(value)) = (indexes.get(field), get_path(new, field)) {
                if index.conflicts(value, id) {
                    return Err(CoreError::uniqueness(collection, field, value));
                }
            }
        }

        for field in &changed {
            if let Some(index) = indexes.get_mut(field) {
                index.remove_document(id, old);
                index.add_document(id, new)?;
            }
        }
        Ok(changed)
    }

    /// Picks the first indexed top-level field with a usable condition
    /// and returns its candidate ids.
    ///
    /// Returns `None` when the filter must be answered by a full scan.
    pub fn query(&self, collection: &str, filter: &Filter) -> Option<IndexScan> {
        let guard = self.collections.read();
        let indexes = guard.get(collection)?;
        filter
            .required_fields()
            .into_iter()
            .find_map(|(field, conditions)| {
                let index = indexes.get(field)?;
                lookup(index, conditions).map(|ids| IndexScan {
                    field: field.to_string(),
                    ids,
                })
            })
    }

    /// Clears and refills every index of a collection from `table`.
    ///
    /// The `_id` index is created if missing. Indexes are swapped in only
    /// once all of them rebuilt successfully.
    pub fn rebuild(&self, collection: &str, table: &DocumentTable) -> CoreResult<()> {
        let specs: Vec<(String, bool)> = self
            .collections
            .read()
            .get(collection)
            .map(|indexes| {
                indexes
                    .values()
                    .map(|index| (index.field().to_string(), index.is_unique()))
                    .collect()
            })
            .unwrap_or_default();

        let mut rebuilt = CollectionIndexes::new();
        if !specs.iter().any(|(field, _)| field == ID_FIELD) {
            rebuilt.insert(
                ID_FIELD.to_string(),
                build_index(collection, ID_FIELD, true, table)?,
            );
        }
        for (field, unique) in specs {
            let index = build_index(collection, &field, unique, table)?;
            rebuilt.insert(field, index);
        }

        info!(collection, indexes = rebuilt.len(), documents = table.len(), "indexes rebuilt");
        self.collections
            .write()
            .insert(collection.to_string(), rebuilt);
        Ok(())
    }

    /// Forgets a collection's indexes. Files are removed with the
    /// collection's storage.
    pub fn drop_collection(&self, collection: &str) -> bool {
        self.collections.write().remove(collection).is_some()
    }

    /// Writes the index files of the given fields.
    pub async fn persist(&self, collection: &str, fields: &[String]) -> CoreResult<()> {
        let files: Vec<(String, Vec<u8>)> = {
            let guard = self.collections.read();
            let Some(indexes) = guard.get(collection) else {
                return Ok(());
            };
            fields
                .iter()
                .filter_map(|field| indexes.get(field))
                .map(|index| Ok((index.field().to_string(), index.to_bytes()?)))
                .collect::<CoreResult<_>>()?
        };
        for (field, bytes) in files {
            self.storage
                .write_index_file(collection, &field, &bytes)
                .await?;
        }
        Ok(())
    }

    /// Writes every index file of a collection.
    pub async fn persist_collection(&self, collection: &str) -> CoreResult<()> {
        let fields: Vec<String> = self
            .collections
            .read()
            .get(collection)
            .map(|indexes| indexes.keys().cloned().collect())
            .unwrap_or_default();
        self.persist(collection, &fields).await
    }

    /// Loads a collection's index files.
    ///
    /// A file that is unreadable, or disagrees with the documents in
    /// `table`, is replaced by an index rebuilt from `table`. Schema
    /// fields without a file are built as well. Uniqueness of rebuilt
    /// indexes follows the schema; the `_id` index is always unique.
    pub async fn load_collection(
        &self,
        collection: &str,
        options: &CollectionOptions,
        table: &DocumentTable,
    ) -> CoreResult<()> {
        let mut fields = self.storage.list_index_files(collection).await?;
        for (field, _) in options.indexed_fields() {
            if !fields.iter().any(|f| f == field) {
                fields.push(field.to_string());
            }
        }
        if !fields.iter().any(|f| f == ID_FIELD) {
            fields.insert(0, ID_FIELD.to_string());
        }

        let mut loaded = CollectionIndexes::new();
        let mut repaired = Vec::new();
        for field in fields {
            let unique = field == ID_FIELD
                || options.schema.get(&field).is_some_and(|spec| spec.unique);
            let bytes = self.storage.read_index_file(collection, &field).await?;
            let index = match bytes.map(|b| FieldIndex::from_bytes(collection, &field, &b)) {
                Some(Ok(index)) if is_consistent(&index, table) => index,
                Some(Ok(index)) => {
                    warn!(collection, field = %field, "index file out of date, rebuilding");
                    repaired.push(field.clone());
                    build_index(collection, &field, index.is_unique(), table)?
                }
                Some(Err(err)) => {
                    warn!(
                        collection,
                        field = %field,
                        error = %err,
                        "index file unreadable, rebuilding"
                    );
                    repaired.push(field.clone());
                    build_index(collection, &field, unique, table)?
                }
                None => {
                    debug!(collection, field = %field, "no index file, building");
                    repaired.push(field.clone());
                    build_index(collection, &field, unique, table)?
                }
            };
            loaded.insert(field, index);
        }

        self.collections
            .write()
            .insert(collection.to_string(), loaded);
        self.persist(collection, &repaired).await
    }
}

fn check_unique(
    collection: &str,
    indexes: &CollectionIndexes,
    id: &str,
    doc: &Document,
) -> CoreResult<()> {
    for (field, index) in indexes {
        if let Some(value) = get_path(doc, field) {
            if index.conflicts(value, id) {
                return Err(CoreError::uniqueness(collection, field, value));
            }
        }
    }
    Ok(())
}

fn build_index(
    collection: &str,
    field: &str,
    unique: bool,
    table: &DocumentTable,
) -> CoreResult<FieldIndex> {
    let mut index = FieldIndex::new(collection, field, unique);
    for (id, doc) in table {
        index.add_document(id, doc)?;
    }
    Ok(index)
}

/// An index agrees with the table when it holds exactly the documents
/// that have the field and every id it names exists.
fn is_consistent(index: &FieldIndex, table: &DocumentTable) -> bool {
    let expected = table
        .values()
        .filter(|doc| get_path(doc, index.field()).is_some())
        .count();
    index.size() == expected && index.ids().all(|id| table.contains_key(id))
}

/// Answers a field's conditions from its index, if any condition allows it.
fn lookup(index: &FieldIndex, conditions: &[Condition]) -> Option<Vec<String>> {
    let mut lower: Option<(&Value, bool)> = None;
    let mut upper: Option<(&Value, bool)> = None;

    for condition in conditions {
        match condition {
            Condition::Eq(value) => return Some(index.find(value)),
            Condition::In(values) => {
                let ids: BTreeSet<String> = values.iter().flat_map(|v| index.find(v)).collect();
                return Some(ids.into_iter().collect());
            }
            Condition::Gt(value) if lower.is_none() => lower = Some((value, false)),
            Condition::Gte(value) if lower.is_none() => lower = Some((value, true)),
            Condition::Lt(value) if upper.is_none() => upper = Some((value, false)),
            Condition::Lte(value) if upper.is_none() => upper = Some((value, true)),
            _ => {}
        }
    }

    if lower.is_none() && upper.is_none() {
        return None;
    }
    Some(index.find_range(
        lower.map(|(v, _)| v),
        upper.map(|(v, _)| v),
        lower.is_some_and(|(_, inclusive)| inclusive),
        upper.is_some_and(|(_, inclusive)| inclusive),
    ))
}
