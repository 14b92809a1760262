//! Query execution over an in-memory document table.

use super::filter::Filter;
use super::options::FindOptions;
use crate::index::{IndexManager, IndexScan};
use crate::types::DocumentTable;
use docudb_codec::{get_path, normalize_key, Document};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

/// How a filter will be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    /// Candidates come from the index on `field` and are re-checked.
    IndexScan {
        /// Indexed field used.
        field: String,
        /// Number of candidate documents.
        candidates: usize,
    },
    /// Every document is tested.
    FullScan,
}

/// Evaluates filters against a collection's documents.
///
/// Index use is transparent: when a top-level condition can be answered
/// by an index, only its candidates are tested, otherwise every document
/// is. Both paths yield the same documents in the same order.
#[derive(Clone)]
pub struct QueryEngine {
    indexes: Arc<IndexManager>,
}

impl QueryEngine {
    /// Creates an engine consulting `indexes`.
    pub fn new(indexes: Arc<IndexManager>) -> Self {
        Self { indexes }
    }

    /// Describes how `filter` would be executed.
    pub fn plan(&self, collection: &str, filter: &Filter) -> QueryPlan {
        match self.indexes.query(collection, filter) {
            Some(IndexScan { field, ids }) => QueryPlan::IndexScan {
                field,
                candidates: ids.len(),
            },
            None => QueryPlan::FullScan,
        }
    }

    /// Ids of matching documents, in table order.
    pub fn matching_ids(
        &self,
        collection: &str,
        table: &DocumentTable,
        filter: &Filter,
    ) -> Vec<String> {
        match self.indexes.query(collection, filter) {
            Some(IndexScan { field, ids }) => {
                trace!(collection, field = %field, candidates = ids.len(), "index scan");
                let mut positions: Vec<usize> = ids
                    .iter()
                    .filter_map(|id| table.get_index_of(id.as_str()))
                    .collect();
                positions.sort_unstable();
                positions.dedup();
                positions
                    .into_iter()
                    .filter_map(|pos| table.get_index(pos))
                    .filter(|(_, doc)| filter.matches(doc))
                    .map(|(id, _)| id.clone())
                    .collect()
            }
            None => {
                trace!(collection, documents = table.len(), "full scan");
                scan(table, filter).map(|(id, _)| id.clone()).collect()
            }
        }
    }

    /// Matching documents, sorted, paginated and projected.
    pub fn find(
        &self,
        collection: &str,
        table: &DocumentTable,
        filter: &Filter,
        options: &FindOptions,
    ) -> Vec<Document> {
        let matched = self
            .matching_ids(collection, table, filter)
            .into_iter()
            .filter_map(|id| table.get(&id).cloned())
            .collect();
        options.apply(matched)
    }

    /// Number of matching documents.
    pub fn count(&self, collection: &str, table: &DocumentTable, filter: &Filter) -> usize {
        self.matching_ids(collection, table, filter).len()
    }

    /// Distinct values of `field` among matching documents, in first-seen
    /// order. Documents without the field contribute nothing.
    pub fn distinct(
        &self,
        collection: &str,
        table: &DocumentTable,
        field: &str,
        filter: &Filter,
    ) -> Vec<Value> {
        let mut seen = HashSet::new();
        self.matching_ids(collection, table, filter)
            .iter()
            .filter_map(|id| table.get(id))
            .filter_map(|doc| get_path(doc, field))
            .filter(|value| seen.insert(normalize_key(value)))
            .cloned()
            .collect()
    }
}

/// Tests every document of `table` against `filter`.
pub fn scan<'a>(
    table: &'a DocumentTable,
    filter: &'a Filter,
) -> impl Iterator<Item = (&'a String, &'a Document)> + 'a {
    table.iter().filter(move |(_, doc)| filter.matches(doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortKey;
    use docudb_storage::{StorageConfig, StorageEngine};
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, QueryEngine, Arc<IndexManager>, DocumentTable) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageEngine::new(StorageConfig::new(dir.path())));
        let indexes = Arc::new(IndexManager::new(storage));
        let table: DocumentTable = [
            json!({"_id": "u1", "name": "Ann", "age": 20, "city": "Oslo"}),
            json!({"_id": "u2", "name": "Ben", "age": 30, "city": "Rome"}),
            json!({"_id": "u3", "name": "Cat", "age": 40, "city": "Oslo"}),
            json!({"_id": "u4", "name": "Dan", "city": "Oslo"}),
        ]
        .into_iter()
        .map(|v| {
            let doc = v.as_object().cloned().unwrap();
            (doc["_id"].as_str().unwrap().to_string(), doc)
        })
        .collect();
        (dir, QueryEngine::new(Arc::clone(&indexes)), indexes, table)
    }

    fn filter(value: Value) -> Filter {
        Filter::parse(&value).unwrap()
    }

    #[test]
    fn index_and_scan_agree() {
        let (_dir, engine, indexes, table) = setup();
        let filters = [
            json!({"age": {"$gte": 30}}),
            json!({"age": {"$gt": 20, "$lte": 40}}),
            json!({"age": {"$in": [40, 20]}}),
            json!({"age": 30, "city": "Rome"}),
            json!({"age": {"$lt": 100}, "city": "Oslo"}),
        ];
        let scanned: Vec<Vec<String>> = filters
            .iter()
            .map(|f| engine.matching_ids("users", &table, &filter(f.clone())))
            .collect();

        indexes.create_index("users", "age", false, &table).unwrap();
        for (f, expected) in filters.iter().zip(&scanned) {
            let parsed = filter(f.clone());
            assert!(matches!(engine.plan("users", &parsed), QueryPlan::IndexScan { .. }));
            assert_eq!(&engine.matching_ids("users", &table, &parsed), expected, "{f}");
        }
    }

    #[test]
    fn find_applies_options() {
        let (_dir, engine, _indexes, table) = setup();
        let options = FindOptions::new().sort(SortKey::desc("age")).limit(1);
        let docs = engine.find("users", &table, &Filter::all(), &options);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["name"], "Cat");

        let docs = engine.find(
            "users",
            &table,
            &filter(json!({"age": {"$gte": 30}})),
            &FindOptions::default(),
        );
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn count_and_distinct() {
        let (_dir, engine, _indexes, table) = setup();
        assert_eq!(engine.count("users", &table, &filter(json!({"city": "Oslo"}))), 3);
        assert_eq!(
            engine.distinct("users", &table, "city", &Filter::all()),
            vec![json!("Oslo"), json!("Rome")]
        );
        assert_eq!(
            engine.distinct("users", &table, "age", &filter(json!({"city": "Oslo"}))),
            vec![json!(20), json!(40)]
        );
    }

    #[test]
    fn plan_without_index_is_full_scan() {
        let (_dir, engine, _indexes, _table) = setup();
        assert_eq!(
            engine.plan("users", &filter(json!({"age": 1}))),
            QueryPlan::FullScan
        );
    }
}
