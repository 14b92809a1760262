//! Property-based test generators using proptest.
//!
//! Provides strategies for generating documents, filters and update
//! documents that stay inside what the engine accepts: field names never
//! start with `$` or `_`, numbers are finite, and nesting is shallow.

use docudb_codec::{Document, StorageFormat};
use proptest::prelude::*;
use serde_json::{json, Map, Number, Value};

/// Integers around 2^53, where `f64` stops representing every integer.
pub const LARGE_INTEGERS: [i64; 3] = [
    9_007_199_254_740_991,
    9_007_199_254_740_992,
    9_007_199_254_740_993,
];

/// Names used by [`person_strategy`] and [`person_filter_strategy`].
pub const PERSON_NAMES: [&str; 5] = ["Alice", "Bob", "Carol", "Dave", "Eve"];

/// Strategy for generating valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,31}").expect("Invalid regex")
}

/// Strategy for generating user field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9]{0,7}").expect("Invalid regex")
}

/// Strategy for the three storage encodings.
pub fn storage_format_strategy() -> impl Strategy<Value = StorageFormat> {
    prop::sample::select(StorageFormat::ALL.to_vec())
}

/// Strategy for finite JSON numbers, both integral and fractional.
pub fn number_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        (-1_000_000i64..1_000_000, 1u32..1000).prop_map(|(whole, frac)| {
            let n = whole as f64 + f64::from(frac) / 1000.0;
            Number::from_f64(n).map_or(Value::Null, Value::Number)
        }),
    ]
}

/// Strategy for scalar JSON values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        number_strategy(),
        ".{0,24}".prop_map(Value::String),
    ]
}

/// Strategy for arbitrary JSON values nested up to three levels.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(field_name_strategy(), inner, 0..6)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Strategy for documents without an `_id`.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map(field_name_strategy(), value_strategy(), 0..8)
        .prop_map(|map| map.into_iter().collect::<Map<String, Value>>())
}

/// Strategy for documents shaped like `{"name", "age", "score"}`.
///
/// `score` mixes numbers (including integers past 2^53), strings and
/// nulls, and is sometimes missing, so filters over it cross type classes.
pub fn person_strategy() -> impl Strategy<Value = Document> {
    (
        prop::sample::select(PERSON_NAMES.to_vec()),
        0i64..100,
        prop::option::of(prop_oneof![
            (0i64..50).prop_map(Value::from),
            prop::sample::select(LARGE_INTEGERS.to_vec()).prop_map(Value::from),
            "[a-c]{1,2}".prop_map(Value::String),
            Just(Value::Null),
        ]),
    )
        .prop_map(|(name, age, score)| {
            let mut doc = Map::new();
            doc.insert("name".into(), json!(name));
            doc.insert("age".into(), json!(age));
            if let Some(score) = score {
                doc.insert("score".into(), score);
            }
            doc
        })
}

fn age_condition_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        (0i64..100).prop_map(|n| json!(n)),
        (0i64..100).prop_map(|n| json!({"$gt": n})),
        (0i64..100).prop_map(|n| json!({"$lte": n})),
        (0i64..100, 0i64..100).prop_map(|(a, b)| json!({"$gte": a.min(b), "$lt": a.max(b)})),
        prop::collection::vec(0i64..100, 0..4).prop_map(|ns| json!({"$in": ns})),
        (0i64..100).prop_map(|n| json!({"$ne": n})),
    ]
}

fn leaf_filter_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        age_condition_strategy().prop_map(|c| json!({"age": c})),
        prop::sample::select(PERSON_NAMES.to_vec()).prop_map(|n| json!({"name": n})),
        prop::collection::vec(prop::sample::select(PERSON_NAMES.to_vec()), 1..3)
            .prop_map(|ns| json!({"name": {"$nin": ns}})),
        (0i64..50).prop_map(|n| json!({"score": {"$gte": n}})),
        prop::sample::select(LARGE_INTEGERS.to_vec()).prop_map(|n| json!({"score": n as f64})),
        prop::sample::select(LARGE_INTEGERS.to_vec())
            .prop_map(|n| json!({"score": {"$in": [n as f64, n]}})),
        prop::sample::select(LARGE_INTEGERS.to_vec())
            .prop_map(|n| json!({"score": {"$gt": n as f64}})),
        "[a-c]".prop_map(|s| json!({"score": {"$lt": s}})),
        any::<bool>().prop_map(|b| json!({"score": {"$exists": b}})),
        Just(json!({"score": null})),
    ]
}

/// Strategy for filters over [`person_strategy`] documents, combining
/// comparisons with `$and`, `$or`, `$nor` and `$not`.
pub fn person_filter_strategy() -> impl Strategy<Value = Value> {
    leaf_filter_strategy().prop_recursive(2, 12, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..3).prop_map(|fs| json!({"$and": fs})),
            prop::collection::vec(inner.clone(), 1..3).prop_map(|fs| json!({"$or": fs})),
            prop::collection::vec(inner.clone(), 1..3).prop_map(|fs| json!({"$nor": fs})),
            inner.prop_map(|f| json!({"$not": f})),
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use docudb_core::query::Filter;

    proptest! {
        #[test]
        fn generated_documents_have_no_reserved_fields(doc in document_strategy()) {
            for key in doc.keys() {
                prop_assert!(!key.starts_with('$'));
                prop_assert!(!key.starts_with('_'));
            }
        }

        #[test]
        fn generated_filters_parse(filter in person_filter_strategy()) {
            prop_assert!(Filter::parse(&filter).is_ok());
        }

        #[test]
        fn generated_people_are_matched_by_own_name(person in person_strategy()) {
            let filter = Filter::parse(&json!({"name": person["name"].clone()})).unwrap();
            prop_assert!(filter.matches(&person));
        }
    }
}
