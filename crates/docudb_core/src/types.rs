//! Core type definitions for DocuDB.

use crate::error::{CoreError, CoreResult};
use docudb_codec::{Document, ValueType, ID_FIELD};
use indexmap::IndexMap;
use serde_json::Value;

/// Name of the creation timestamp field.
pub const CREATED_AT_FIELD: &str = "_createdAt";

/// Name of the last-update timestamp field.
pub const UPDATED_AT_FIELD: &str = "_updatedAt";

/// In-memory documents of one collection, keyed by id.
///
/// Iteration follows insertion order, which is also the order results
/// are produced in before sorting.
pub type DocumentTable = IndexMap<String, Document>;

/// Generates a fresh document id.
#[must_use]
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Returns the document's `_id` if it is a string.
#[must_use]
pub fn id_of(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// Converts a JSON object into a document.
///
/// # Errors
///
/// Anything but an object is an invalid document.
pub fn to_document(value: Value) -> CoreResult<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(CoreError::invalid_document(format!(
            "expected an object, found {}",
            ValueType::of(&other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generated_ids_are_distinct_uuids() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn id_must_be_a_string() {
        let doc = json!({"_id": "x"});
        assert_eq!(id_of(doc.as_object().unwrap()), Some("x"));
        let doc = json!({"_id": 7});
        assert_eq!(id_of(doc.as_object().unwrap()), None);
    }

    #[test]
    fn only_objects_are_documents() {
        assert!(to_document(json!({"a": 1})).is_ok());
        assert!(to_document(json!([1])).is_err());
    }
}
