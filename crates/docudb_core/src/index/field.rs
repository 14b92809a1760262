//! Single-field index.

use crate::error::{CoreError, CoreResult};
use docudb_codec::{
    compare_values, denormalize_key, get_path, normalize_key, Document, ValueType,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Maps the normalized values of one field to the ids holding them.
///
/// `FieldIndex` supports:
/// - Exact lookups by normalized key
/// - Range scans in value order
/// - Uniqueness enforcement
///
/// Keys are produced by [`normalize_key`], so `1`, `"1"` and `true`
/// never share an entry. Range scans need value order rather than key
/// order; the sorted key list is rebuilt lazily after any mutation.
pub struct FieldIndex {
    /// Owning collection, for error messages.
    collection: String,
    /// Dotted field path.
    field: String,
    /// Whether a key may map to more than one id.
    unique: bool,
    /// Normalized key to ids.
    entries: BTreeMap<String, BTreeSet<String>>,
    /// Number of (key, id) pairs.
    count: usize,
    /// Keys in value order, `None` while dirty.
    sorted: Mutex<Option<Vec<(Value, String)>>>,
}

/// Summary of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Indexed field.
    pub field: String,
    /// Whether the index is unique.
    pub unique: bool,
    /// Number of distinct values.
    pub keys: usize,
    /// Number of indexed documents.
    pub entries: usize,
}

/// On-disk form of an index.
#[derive(Serialize, Deserialize)]
struct IndexFile {
    field: String,
    unique: bool,
    entries: BTreeMap<String, Vec<String>>,
}

impl FieldIndex {
    /// Creates an empty index.
    pub fn new(collection: impl Into<String>, field: impl Into<String>, unique: bool) -> Self {
        Self {
            collection: collection.into(),
            field: field.into(),
            unique,
            entries: BTreeMap::new(),
            count: 0,
            sorted: Mutex::new(None),
        }
    }

    /// Returns the indexed field path.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Returns true for unique indexes.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Adds `id` under `value`.
    ///
    /// # Errors
    ///
    /// A unique index already holding a different id for the value
    /// returns a uniqueness error and is left unchanged.
    pub fn add(&mut self, value: &Value, id: &str) -> CoreResult<()> {
        let key = normalize_key(value);
        if self.unique {
            if let Some(existing) = self.entries.get(&key) {
                if !existing.contains(id) {
                    return Err(CoreError::uniqueness(&self.collection, &self.field, value));
                }
            }
        }
        if self.entries.entry(key).or_default().insert(id.to_string()) {
            self.count += 1;
            self.mark_dirty();
        }
        Ok(())
    }

    /// Removes `id` from under `value`, dropping the key once empty.
    ///
    /// Returns true if the pair was present.
    pub fn remove(&mut self, value: &Value, id: &str) -> bool {
        let key = normalize_key(value);
        let Some(ids) = self.entries.get_mut(&key) else {
            return false;
        };
        if !ids.remove(id) {
            return false;
        }
        if ids.is_empty() {
            self.entries.remove(&key);
        }
        self.count -= 1;
        self.mark_dirty();
        true
    }

    /// Adds a document if it has the indexed field.
    pub fn add_document(&mut self, id: &str, doc: &Document) -> CoreResult<bool> {
        match get_path(doc, &self.field) {
            Some(value) => self.add(value, id).map(|()| true),
            None => Ok(false),
        }
    }

    /// Removes a document if it has the indexed field.
    pub fn remove_document(&mut self, id: &str, doc: &Document) -> bool {
        match get_path(doc, &self.field) {
            Some(value) => self.remove(value, id),
            None => false,
        }
    }

    /// Returns true if the uniqueness check would reject `value` for `id`.
    pub fn conflicts(&self, value: &Value, id: &str) -> bool {
        self.unique
            && self
                .entries
                .get(&normalize_key(value))
                .is_some_and(|ids| !ids.contains(id))
    }

    /// Returns the ids stored under `value`.
    pub fn find(&self, value: &Value) -> Vec<String> {
        self.entries
            .get(&normalize_key(value))
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the ids whose value lies between the bounds.
    ///
    /// Only values of the same type class as the bounds are returned,
    /// matching the range operators of the query engine.
    pub fn find_range(
        &self,
        min: Option<&Value>,
        max: Option<&Value>,
        include_min: bool,
        include_max: bool,
    ) -> Vec<String> {
        let class = match (min, max) {
            (Some(lo), Some(hi)) if ValueType::of(lo) != ValueType::of(hi) => return Vec::new(),
            (Some(bound), _) | (None, Some(bound)) => ValueType::of(bound),
            (None, None) => return self.all_ids(),
        };

        let mut guard = self.sorted.lock();
        let sorted = guard.get_or_insert_with(|| self.sort_keys());

        let mut result = Vec::new();
        for (value, key) in sorted.iter() {
            match ValueType::of(value).cmp(&class) {
                Ordering::Less => continue,
                Ordering::Greater => break,
                Ordering::Equal => {}
            }
            if let Some(lo) = min {
                match compare_values(value, lo) {
                    Ordering::Less => continue,
                    Ordering::Equal if !include_min => continue,
                    _ => {}
                }
            }
            if let Some(hi) = max {
                match compare_values(value, hi) {
                    Ordering::Greater => break,
                    Ordering::Equal if !include_max => break,
                    _ => {}
                }
            }
            if let Some(ids) = self.entries.get(key) {
                result.extend(ids.iter().cloned());
            }
        }
        result
    }

    fn all_ids(&self) -> Vec<String> {
        self.entries.values().flatten().cloned().collect()
    }

    fn sort_keys(&self) -> Vec<(Value, String)> {
        let mut keys: Vec<(Value, String)> = self
            .entries
            .keys()
            .map(|key| (denormalize_key(key), key.clone()))
            .collect();
        keys.sort_by(|a, b| compare_values(&a.0, &b.0));
        keys
    }

    fn mark_dirty(&mut self) {
        *self.sorted.get_mut() = None;
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.count = 0;
        self.mark_dirty();
    }

    /// Number of indexed (value, id) pairs.
    pub fn size(&self) -> usize {
        self.count
    }

    /// Number of distinct values.
    pub fn unique_value_count(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over every indexed id.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.values().flatten().map(String::as_str)
    }

    /// Returns a summary of the index.
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            field: self.field.clone(),
            unique: self.unique,
            keys: self.unique_value_count(),
            entries: self.size(),
        }
    }

    /// Serializes the index as `{field, unique, entries: {key: [ids]}}`.
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        let file = IndexFile {
            field: self.field.clone(),
            unique: self.unique,
            entries: self
                .entries
                .iter()
                .map(|(key, ids)| (key.clone(), ids.iter().cloned().collect()))
                .collect(),
        };
        serde_json::to_vec(&file).map_err(|err| {
            CoreError::index_corruption(&self.collection, &self.field, err.to_string())
        })
    }

    /// Deserializes an index written by [`FieldIndex::to_bytes`].
    ///
    /// # Errors
    ///
    /// Unparseable bytes, a field mismatch, or a unique index with a
    /// shared key are reported as index corruption.
    pub fn from_bytes(collection: &str, field: &str, bytes: &[u8]) -> CoreResult<Self> {
        let file: IndexFile = serde_json::from_slice(bytes)
            .map_err(|err| CoreError::index_corruption(collection, field, err.to_string()))?;
        if file.field != field {
            return Err(CoreError::index_corruption(
                collection,
                field,
                format!("file describes field '{}'", file.field),
            ));
        }

        let mut index = Self::new(collection, field, file.unique);
        for (key, ids) in file.entries {
            if ids.is_empty() {
                continue;
            }
            if index.unique && ids.len() > 1 {
                return Err(CoreError::index_corruption(
                    collection,
                    field,
                    format!("unique key {key} maps to {} documents", ids.len()),
                ));
            }
            let set: BTreeSet<String> = ids.into_iter().collect();
            index.count += set.len();
            index.entries.insert(key, set);
        }
        Ok(index)
    }
}

impl fmt::Debug for FieldIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldIndex")
            .field("collection", &self.collection)
            .field("field", &self.field)
            .field("unique", &self.unique)
            .field("keys", &self.entries.len())
            .field("entries", &self.count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sorted(mut ids: Vec<String>) -> Vec<String> {
        ids.sort();
        ids
    }

    #[test]
    fn add_find_remove() {
        let mut index = FieldIndex::new("users", "age", false);
        index.add(&json!(30), "a").unwrap();
        index.add(&json!(30), "b").unwrap();
        index.add(&json!(40), "c").unwrap();

        assert_eq!(index.find(&json!(30)), vec!["a", "b"]);
        assert_eq!(index.find(&json!(30.0)), vec!["a", "b"]);
        assert!(index.find(&json!("30")).is_empty());
        assert_eq!(index.size(), 3);
        assert_eq!(index.unique_value_count(), 2);

        assert!(index.remove(&json!(30), "a"));
        assert!(!index.remove(&json!(30), "a"));
        assert!(index.remove(&json!(30), "b"));
        assert!(index.find(&json!(30)).is_empty());
        assert_eq!(index.unique_value_count(), 1);
    }

    #[test]
    fn type_tags_keep_values_apart() {
        let mut index = FieldIndex::new("c", "v", true);
        index.add(&json!(1), "num").unwrap();
        index.add(&json!("1"), "str").unwrap();
        index.add(&json!(true), "bool").unwrap();
        index.add(&json!(null), "null").unwrap();
        assert_eq!(index.unique_value_count(), 4);
    }

    #[test]
    fn unique_index_rejects_second_id() {
        let mut index = FieldIndex::new("users", "email", true);
        index.add(&json!("a@x.com"), "1").unwrap();
        index.add(&json!("a@x.com"), "1").unwrap();

        let err = index.add(&json!("a@x.com"), "2").unwrap_err();
        assert!(err.is_uniqueness());
        assert_eq!(index.find(&json!("a@x.com")), vec!["1"]);
        assert!(index.conflicts(&json!("a@x.com"), "2"));
        assert!(!index.conflicts(&json!("a@x.com"), "1"));
    }

    #[test]
    fn range_scans_follow_value_order() {
        let mut index = FieldIndex::new("c", "n", false);
        for (n, id) in [(2, "two"), (10, "ten"), (-3, "neg"), (7, "seven")] {
            index.add(&json!(n), id).unwrap();
        }
        index.add(&json!("5"), "string").unwrap();

        let gte = index.find_range(Some(&json!(2)), None, true, false);
        assert_eq!(sorted(gte), vec!["seven", "ten", "two"]);

        let between = index.find_range(Some(&json!(2)), Some(&json!(10)), false, false);
        assert_eq!(between, vec!["seven"]);

        let lt = index.find_range(None, Some(&json!(7)), false, false);
        assert_eq!(lt, vec!["neg", "two"]);

        let strings = index.find_range(Some(&json!("")), None, true, true);
        assert_eq!(strings, vec!["string"]);
    }

    #[test]
    fn range_cache_refreshes_after_mutation() {
        let mut index = FieldIndex::new("c", "n", false);
        index.add(&json!(1), "a").unwrap();
        assert_eq!(index.find_range(Some(&json!(0)), None, true, true), vec!["a"]);

        index.add(&json!(5), "b").unwrap();
        index.remove(&json!(1), "a");
        assert_eq!(index.find_range(Some(&json!(0)), None, true, true), vec!["b"]);
    }

    #[test]
    fn date_ranges() {
        let mut index = FieldIndex::new("c", "at", false);
        index
            .add(&json!({"$date": "2020-01-01T00:00:00Z"}), "old")
            .unwrap();
        index
            .add(&json!({"$date": "2024-06-01T12:00:00+02:00"}), "new")
            .unwrap();
        let recent = index.find_range(
            Some(&json!({"$date": "2022-01-01T00:00:00Z"})),
            None,
            false,
            false,
        );
        assert_eq!(recent, vec!["new"]);
    }

    #[test]
    fn documents_without_field_are_skipped() {
        let mut index = FieldIndex::new("c", "address.city", true);
        let with = json!({"address": {"city": "Oslo"}});
        let without = json!({"name": "x"});
        assert!(index.add_document("1", with.as_object().unwrap()).unwrap());
        assert!(!index.add_document("2", without.as_object().unwrap()).unwrap());
        assert!(!index.add_document("3", without.as_object().unwrap()).unwrap());
        assert_eq!(index.size(), 1);
    }

    #[test]
    fn persistence_roundtrip() {
        let mut index = FieldIndex::new("users", "age", false);
        index.add(&json!(30), "a").unwrap();
        index.add(&json!(30), "b").unwrap();
        index.add(&json!({"k": [1, 2]}), "c").unwrap();

        let bytes = index.to_bytes().unwrap();
        let text: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(text["field"], "age");
        assert_eq!(text["entries"]["number:30"], json!(["a", "b"]));

        let loaded = FieldIndex::from_bytes("users", "age", &bytes).unwrap();
        assert_eq!(loaded.stats(), index.stats());
        assert_eq!(loaded.find(&json!({"k": [1, 2]})), vec!["c"]);
    }

    #[test]
    fn damaged_files_are_corruption() {
        let err = FieldIndex::from_bytes("users", "age", b"{not json").unwrap_err();
        assert!(err.is_corruption());

        let wrong = br#"{"field":"name","unique":false,"entries":{}}"#;
        assert!(FieldIndex::from_bytes("users", "age", wrong).is_err());

        let shared = br#"{"field":"email","unique":true,"entries":{"string:a":["1","2"]}}"#;
        assert!(FieldIndex::from_bytes("users", "email", shared).is_err());
    }
}
