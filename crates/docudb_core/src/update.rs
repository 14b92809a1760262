//! Update documents.
//!
//! An update is parsed once into an [`UpdateSpec`] and applied as a pure
//! function: the input document is never modified, a new one is returned.
//! Operators apply in a fixed order regardless of how they are written:
//!
//! ```text
//! $set -> $unset -> $inc -> $push -> $pull -> plain field assignments
//! ```

use crate::error::{CoreError, CoreResult};
use docudb_codec::{get_path, remove_path, set_path, values_equal, Document, ID_FIELD};
use serde_json::{Map, Number, Value};

/// A parsed update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSpec {
    set: Vec<(String, Value)>,
    unset: Vec<String>,
    inc: Vec<(String, Number)>,
    push: Vec<(String, Vec<Value>)>,
    pull: Vec<(String, Value)>,
    assign: Vec<(String, Value)>,
}

impl UpdateSpec {
    /// Parses an update document.
    ///
    /// # Errors
    ///
    /// Unknown `$` operators and operands of the wrong shape are
    /// rejected with [`CoreError::InvalidUpdate`].
    pub fn parse(value: &Value) -> CoreResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| CoreError::invalid_update("update must be an object"))?;

        let mut spec = Self::default();
        for (key, operand) in map {
            match key.as_str() {
                "$set" => spec.set.extend(fields(key, operand)?.map(|(k, v)| (k, v.clone()))),
                "$unset" => spec.unset.extend(fields(key, operand)?.map(|(k, _)| k)),
                "$inc" => {
                    for (path, amount) in fields(key, operand)? {
                        let Value::Number(n) = amount else {
                            return Err(CoreError::invalid_update(format!(
                                "$inc amount for '{path}' must be a number"
                            )));
                        };
                        spec.inc.push((path, n.clone()));
                    }
                }
                "$push" => {
                    for (path, item) in fields(key, operand)? {
                        spec.push.push((path, push_items(item)));
                    }
                }
                "$pull" => spec.pull.extend(fields(key, operand)?.map(|(k, v)| (k, v.clone()))),
                op if op.starts_with('$') => {
                    return Err(CoreError::invalid_update(format!(
                        "unsupported update operator: {op}"
                    )))
                }
                field => spec.assign.push((field.to_string(), operand.clone())),
            }
        }
        Ok(spec)
    }

    /// Returns true if the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
            && self.unset.is_empty()
            && self.inc.is_empty()
            && self.push.is_empty()
            && self.pull.is_empty()
            && self.assign.is_empty()
    }

    /// Applies the update, returning the new document.
    ///
    /// # Errors
    ///
    /// Fails if the update would change `_id`, increments a non-number,
    /// pushes onto a non-array, or writes through a non-object value.
    pub fn apply(&self, doc: &Document) -> CoreResult<Document> {
        let mut out = doc.clone();

        for (path, value) in &self.set {
            assign(&mut out, path, value.clone())?;
        }
        for path in &self.unset {
            remove_path(&mut out, path);
        }
        for (path, amount) in &self.inc {
            let sum = match get_path(&out, path) {
                None => Value::Number(amount.clone()),
                Some(Value::Number(base)) => Value::Number(add(base, amount)?),
                Some(_) => {
                    return Err(CoreError::invalid_update(format!(
                        "cannot $inc non-numeric field '{path}'"
                    )))
                }
            };
            assign(&mut out, path, sum)?;
        }
        for (path, items) in &self.push {
            let array = match get_path(&out, path) {
                None => items.clone(),
                Some(Value::Array(existing)) => {
                    let mut array = existing.clone();
                    array.extend(items.iter().cloned());
                    array
                }
                Some(_) => {
                    return Err(CoreError::invalid_update(format!(
                        "cannot $push onto non-array field '{path}'"
                    )))
                }
            };
            assign(&mut out, path, Value::Array(array))?;
        }
        for (path, target) in &self.pull {
            if let Some(Value::Array(existing)) = get_path(&out, path) {
                let kept: Vec<Value> = existing
                    .iter()
                    .filter(|item| !values_equal(item, target))
                    .cloned()
                    .collect();
                assign(&mut out, path, Value::Array(kept))?;
            }
        }
        for (path, value) in &self.assign {
            assign(&mut out, path, value.clone())?;
        }

        if out.get(ID_FIELD) != doc.get(ID_FIELD) {
            return Err(CoreError::invalid_update("_id cannot be modified"));
        }
        Ok(out)
    }
}

fn fields<'a>(
    op: &str,
    operand: &'a Value,
) -> CoreResult<impl Iterator<Item = (String, &'a Value)> + 'a> {
    let map: &Map<String, Value> = operand
        .as_object()
        .ok_or_else(|| CoreError::invalid_update(format!("{op} expects an object of fields")))?;
    Ok(map.iter().map(|(k, v)| (k.clone(), v)))
}

/// `{"$each": [..]}` pushes several items, anything else pushes one.
fn push_items(item: &Value) -> Vec<Value> {
    match item {
        Value::Object(map) if map.len() == 1 => match map.get("$each") {
            Some(Value::Array(items)) => items.clone(),
            _ => vec![item.clone()],
        },
        _ => vec![item.clone()],
    }
}

fn assign(doc: &mut Document, path: &str, value: Value) -> CoreResult<()> {
    if set_path(doc, path, value) {
        Ok(())
    } else {
        Err(CoreError::invalid_update(format!(
            "cannot set '{path}' through a non-object value"
        )))
    }
}

fn add(base: &Number, amount: &Number) -> CoreResult<Number> {
    if let (Some(a), Some(b)) = (base.as_i64(), amount.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(Number::from(sum));
        }
    }
    let a = base.as_f64().unwrap_or(0.0);
    let b = amount.as_f64().unwrap_or(0.0);
    Number::from_f64(a + b)
        .ok_or_else(|| CoreError::invalid_update("increment produced a non-finite number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn apply(update: Value, d: Value) -> CoreResult<Value> {
        UpdateSpec::parse(&update)?
            .apply(&doc(d))
            .map(Value::Object)
    }

    #[test]
    fn set_then_inc() {
        let out = apply(
            json!({"$set": {"a": 1}, "$inc": {"b": 2}}),
            json!({"a": 0, "b": 3}),
        )
        .unwrap();
        assert_eq!(out, json!({"a": 1, "b": 5}));
    }

    #[test]
    fn precedence_is_fixed() {
        // $inc runs after $set even when written first.
        let out = apply(json!({"$inc": {"n": 1}, "$set": {"n": 10}}), json!({"n": 0})).unwrap();
        assert_eq!(out, json!({"n": 11}));

        // $unset runs after $set.
        let out = apply(json!({"$unset": {"x": ""}, "$set": {"x": 1}}), json!({})).unwrap();
        assert_eq!(out, json!({}));
    }

    #[test]
    fn input_is_not_modified() {
        let original = doc(json!({"n": 1}));
        let spec = UpdateSpec::parse(&json!({"$inc": {"n": 1}})).unwrap();
        let updated = spec.apply(&original).unwrap();
        assert_eq!(original["n"], 1);
        assert_eq!(updated["n"], 2);
    }

    #[test]
    fn inc_defaults_to_zero_and_handles_floats() {
        let out = apply(json!({"$inc": {"n": 2, "f": 0.5}}), json!({"f": 1})).unwrap();
        assert_eq!(out, json!({"f": 1.5, "n": 2}));
        assert!(apply(json!({"$inc": {"s": 1}}), json!({"s": "x"})).is_err());
        assert!(apply(json!({"$inc": {"n": "1"}}), json!({})).is_err());
    }

    #[test]
    fn push_and_pull() {
        let out = apply(json!({"$push": {"tags": "a"}}), json!({})).unwrap();
        assert_eq!(out, json!({"tags": ["a"]}));

        let out = apply(
            json!({"$push": {"tags": {"$each": ["b", "c"]}}}),
            json!({"tags": ["a"]}),
        )
        .unwrap();
        assert_eq!(out, json!({"tags": ["a", "b", "c"]}));

        let out = apply(json!({"$pull": {"n": 1}}), json!({"n": [1, 2, 1.0, "1"]})).unwrap();
        assert_eq!(out, json!({"n": [2, "1"]}));

        let out = apply(json!({"$pull": {"missing": 1}}), json!({"a": 1})).unwrap();
        assert_eq!(out, json!({"a": 1}));

        assert!(apply(json!({"$push": {"a": 1}}), json!({"a": 1})).is_err());
    }

    #[test]
    fn nested_paths_and_direct_assignment() {
        let out = apply(
            json!({"$set": {"address.city": "Oslo"}, "name": "Ann"}),
            json!({"name": "Al"}),
        )
        .unwrap();
        assert_eq!(out, json!({"name": "Ann", "address": {"city": "Oslo"}}));

        assert!(apply(json!({"$set": {"name.first": "A"}}), json!({"name": "Al"})).is_err());
    }

    #[test]
    fn id_is_immutable() {
        assert!(apply(json!({"$set": {"_id": "other"}}), json!({"_id": "a"})).is_err());
        assert!(apply(json!({"$unset": {"_id": 1}}), json!({"_id": "a"})).is_err());
        assert!(apply(json!({"$set": {"_id": "a"}}), json!({"_id": "a"})).is_ok());
    }

    #[test]
    fn malformed_updates() {
        assert!(UpdateSpec::parse(&json!({"$rename": {"a": "b"}})).is_err());
        assert!(UpdateSpec::parse(&json!({"$set": 1})).is_err());
        assert!(UpdateSpec::parse(&json!([1])).is_err());
        assert!(UpdateSpec::parse(&json!({})).unwrap().is_empty());
    }
}
