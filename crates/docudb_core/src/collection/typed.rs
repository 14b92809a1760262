//! Typed collection access.

use super::handle::Collection;
use crate::error::{CoreError, CoreResult};
use crate::query::FindOptions;
use crate::types::to_document;
use docudb_codec::Document;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;

/// A collection viewed through a serde type.
///
/// `TypedCollection<T>` converts between `T` and documents with
/// `serde_json`, so callers work with their own structs while the
/// collection keeps storing plain documents. Audit fields the struct
/// does not declare are ignored on the way out.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct User {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
///     id: Option<String>,
///     name: String,
///     age: u32,
/// }
///
/// let users: TypedCollection<User> = db.collection("users").await?.typed();
/// users.insert(&User { id: None, name: "Alice".into(), age: 30 }).await?;
/// let adults = users.find(&json!({"age": {"$gte": 18}}), &FindOptions::new()).await?;
/// ```
pub struct TypedCollection<T> {
    inner: Collection,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedCollection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> TypedCollection<T> {
    /// Wraps an untyped collection.
    pub fn new(inner: Collection) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Returns the underlying collection.
    pub fn inner(&self) -> &Collection {
        &self.inner
    }

    /// Inserts a value and returns its id.
    pub async fn insert(&self, value: &T) -> CoreResult<String> {
        self.inner.insert(encode(value)?).await
    }

    /// Looks up a value by id.
    pub async fn find_by_id(&self, id: &str) -> CoreResult<Option<T>> {
        self.inner.find_by_id(id).await?.map(decode).transpose()
    }

    /// Finds matching values.
    pub async fn find(&self, filter: &Value, options: &FindOptions) -> CoreResult<Vec<T>> {
        self.inner
            .find(filter, options)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Finds the first matching value.
    pub async fn find_one(&self, filter: &Value) -> CoreResult<Option<T>> {
        self.inner
            .find_one(filter, &FindOptions::default())
            .await?
            .map(decode)
            .transpose()
    }
}

impl Collection {
    /// Views this collection through the serde type `T`.
    pub fn typed<T: Serialize + DeserializeOwned>(&self) -> TypedCollection<T> {
        TypedCollection::new(self.clone())
    }
}

fn encode<T: Serialize>(value: &T) -> CoreResult<Document> {
    let value = serde_json::to_value(value)
        .map_err(|err| CoreError::invalid_document(err.to_string()))?;
    to_document(value)
}

fn decode<T: DeserializeOwned>(doc: Document) -> CoreResult<T> {
    serde_json::from_value(Value::Object(doc))
        .map_err(|err| CoreError::invalid_document(err.to_string()))
}
