//! Result shaping: sort, skip, limit and projection.

use super::error::{QueryError, QueryResult};
use docudb_codec::{compare_optional, get_path, remove_path, set_path, Document, ID_FIELD};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

impl SortOrder {
    fn from_value(value: &Value) -> QueryResult<Self> {
        match value.as_i64() {
            Some(1) => Ok(Self::Ascending),
            Some(-1) => Ok(Self::Descending),
            _ => match value.as_str() {
                Some("asc" | "ascending") => Ok(Self::Ascending),
                Some("desc" | "descending") => Ok(Self::Descending),
                _ => Err(QueryError::invalid_filter(format!(
                    "sort direction must be 1 or -1, found {value}"
                ))),
            },
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Dotted field path.
    pub field: String,
    /// Direction.
    pub order: SortOrder,
}

impl SortKey {
    /// Ascending sort on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Ascending,
        }
    }

    /// Descending sort on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Descending,
        }
    }
}

/// Field selection applied to results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Only the listed fields, plus `_id` unless `exclude_id`.
    Include {
        /// Fields to keep.
        fields: Vec<String>,
        /// Whether `_id` was explicitly excluded.
        exclude_id: bool,
    },
    /// Every field except the listed ones.
    Exclude(Vec<String>),
}

impl Projection {
    /// Parses a projection document such as `{"name": 1, "_id": 0}`.
    ///
    /// The projection is inclusive as soon as any value is `1` or `true`.
    pub fn parse(map: &Map<String, Value>) -> QueryResult<Self> {
        let inclusive = map.values().any(is_inclusion);
        if inclusive {
            let exclude_id = map.get(ID_FIELD).is_some_and(|v| !is_inclusion(v));
            let fields = map
                .iter()
                .filter(|(_, v)| is_inclusion(v))
                .map(|(k, _)| k.clone())
                .collect();
            Ok(Self::Include { fields, exclude_id })
        } else {
            Ok(Self::Exclude(map.keys().cloned().collect()))
        }
    }

    /// Applies the projection to a document.
    #[must_use]
    pub fn apply(&self, doc: &Document) -> Document {
        match self {
            Self::Include { fields, exclude_id } => {
                let mut out = Document::new();
                if !exclude_id {
                    if let Some(id) = doc.get(ID_FIELD) {
                        out.insert(ID_FIELD.to_string(), id.clone());
                    }
                }
                for field in fields {
                    if let Some(value) = get_path(doc, field) {
                        set_path(&mut out, field, value.clone());
                    }
                }
                out
            }
            Self::Exclude(fields) => {
                let mut out = doc.clone();
                for field in fields {
                    remove_path(&mut out, field);
                }
                out
            }
        }
    }
}

fn is_inclusion(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() == Some(1.0),
        _ => false,
    }
}

/// Options for `find`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Sort keys in priority order.
    pub sort: Vec<SortKey>,
    /// Number of sorted results to drop.
    pub skip: usize,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Field selection.
    pub projection: Option<Projection>,
}

impl FindOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sort key.
    #[must_use]
    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    /// Sets the number of results to skip.
    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the projection.
    #[must_use]
    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Parses options written as a document:
    /// `{"sort": {"age": -1}, "skip": 10, "limit": 5, "projection": {"name": 1}}`.
    pub fn from_value(value: &Value) -> QueryResult<Self> {
        let map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            _ => return Err(QueryError::invalid_filter("options must be an object")),
        };

        let mut options = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "sort" => {
                    let keys = value
                        .as_object()
                        .ok_or_else(|| QueryError::invalid_filter("sort must be an object"))?;
                    for (field, direction) in keys {
                        options.sort.push(SortKey {
                            field: field.clone(),
                            order: SortOrder::from_value(direction)?,
                        });
                    }
                }
                "skip" => options.skip = count_option(key, value)?,
                "limit" => options.limit = Some(count_option(key, value)?),
                "projection" => {
                    let fields = value
                        .as_object()
                        .ok_or_else(|| QueryError::invalid_filter("projection must be an object"))?;
                    options.projection = Some(Projection::parse(fields)?);
                }
                other => {
                    return Err(QueryError::invalid_filter(format!("unknown option '{other}'")))
                }
            }
        }
        Ok(options)
    }

    /// Compares two documents by the sort keys.
    #[must_use]
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for key in &self.sort {
            let ordering = compare_optional(get_path(a, &key.field), get_path(b, &key.field));
            let ordering = match key.order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Sorts, paginates and projects matched documents.
    #[must_use]
    pub fn apply(&self, mut docs: Vec<Document>) -> Vec<Document> {
        if !self.sort.is_empty() {
            docs.sort_by(|a, b| self.compare(a, b));
        }
        let page = docs
            .into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX));
        match &self.projection {
            Some(projection) => page.map(|doc| projection.apply(&doc)).collect(),
            None => page.collect(),
        }
    }
}

fn count_option(key: &str, value: &Value) -> QueryResult<usize> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| QueryError::invalid_filter(format!("{key} must be a non-negative integer")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn people() -> Vec<Document> {
        vec![
            doc(json!({"_id": "a", "name": "Cy", "age": 30})),
            doc(json!({"_id": "b", "name": "Al", "age": 40})),
            doc(json!({"_id": "c", "name": "Bo", "age": 30})),
            doc(json!({"_id": "d", "name": "Di"})),
        ]
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d["_id"].as_str().unwrap()).collect()
    }

    #[test]
    fn multi_key_sort_is_stable() {
        let options = FindOptions::new()
            .sort(SortKey::desc("age"))
            .sort(SortKey::asc("name"));
        let sorted = options.apply(people());
        assert_eq!(ids(&sorted), vec!["b", "c", "a", "d"]);
    }

    #[test]
    fn missing_values_sort_first_ascending() {
        let sorted = FindOptions::new().sort(SortKey::asc("age")).apply(people());
        assert_eq!(ids(&sorted), vec!["d", "a", "c", "b"]);
    }

    #[test]
    fn skip_and_limit_apply_after_sort() {
        let options = FindOptions::new().sort(SortKey::asc("name")).skip(1).limit(2);
        assert_eq!(ids(&options.apply(people())), vec!["c", "a"]);
        assert!(FindOptions::new().skip(10).apply(people()).is_empty());
    }

    #[test]
    fn inclusive_projection_keeps_id() {
        let projection = Projection::parse(&doc(json!({"name": 1}))).unwrap();
        let out = projection.apply(&people()[0]);
        assert_eq!(Value::Object(out), json!({"_id": "a", "name": "Cy"}));

        let projection = Projection::parse(&doc(json!({"name": true, "_id": 0}))).unwrap();
        let out = projection.apply(&people()[0]);
        assert_eq!(Value::Object(out), json!({"name": "Cy"}));
    }

    #[test]
    fn inclusion_wins_over_exclusion() {
        let projection = Projection::parse(&doc(json!({"age": 0, "name": 1}))).unwrap();
        assert!(matches!(projection, Projection::Include { .. }));
        let out = projection.apply(&people()[1]);
        assert_eq!(Value::Object(out), json!({"_id": "b", "name": "Al"}));
    }

    #[test]
    fn exclusive_projection_drops_fields() {
        let projection = Projection::parse(&doc(json!({"age": 0, "_id": false}))).unwrap();
        let out = projection.apply(&people()[1]);
        assert_eq!(Value::Object(out), json!({"name": "Al"}));
    }

    #[test]
    fn nested_projection() {
        let source = doc(json!({"_id": "x", "address": {"city": "Oslo", "zip": "1"}}));
        let projection = Projection::parse(&doc(json!({"address.city": 1}))).unwrap();
        assert_eq!(
            Value::Object(projection.apply(&source)),
            json!({"_id": "x", "address": {"city": "Oslo"}})
        );
    }

    #[test]
    fn options_from_value() {
        let options = FindOptions::from_value(&json!({
            "sort": {"age": -1, "name": 1},
            "skip": 2,
            "limit": 1,
            "projection": {"name": 1}
        }))
        .unwrap();
        assert_eq!(options.sort, vec![SortKey::desc("age"), SortKey::asc("name")]);
        assert_eq!(options.skip, 2);
        assert_eq!(options.limit, Some(1));
        assert!(options.projection.is_some());

        assert!(FindOptions::from_value(&json!({"limit": -1})).is_err());
        assert!(FindOptions::from_value(&json!({"sort": {"a": 2}})).is_err());
        assert!(FindOptions::from_value(&json!({"hint": "a"})).is_err());
    }
}
