//! Document value model.
//!
//! A [`Document`] is an ordered JSON object. This module defines how
//! document values are classified, compared, addressed by dotted paths,
//! and normalized into index keys.
//!
//! ## Ordering
//!
//! Values of different type classes order as:
//!
//! ```text
//! missing < null < number < string < object < array < boolean < date
//! ```
//!
//! Dates are written as `{"$date": "<rfc3339>"}` and compare by instant.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::fmt;

/// A document: an ordered key/value map.
pub type Document = Map<String, Value>;

/// Name of the document identifier field.
pub const ID_FIELD: &str = "_id";

/// Key marking a date literal.
pub const DATE_KEY: &str = "$date";

/// The type class of a document value.
///
/// Variants are declared in sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    /// JSON `null`.
    Null,
    /// Any JSON number.
    Number,
    /// A string.
    String,
    /// An object that is not a date literal.
    Object,
    /// An array.
    Array,
    /// `true` or `false`.
    Boolean,
    /// A `{"$date": ...}` literal.
    Date,
}

impl ValueType {
    /// Returns the type class of `value`.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) if as_date(value).is_some() => Self::Date,
            Value::Object(_) => Self::Object,
        }
    }

    /// Returns the lowercase name used by `$type` and hybrid placeholders.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Number => "number",
            Self::String => "string",
            Self::Object => "object",
            Self::Array => "array",
            Self::Boolean => "boolean",
            Self::Date => "date",
        }
    }

    /// Parses a type name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "null" => Some(Self::Null),
            "number" => Some(Self::Number),
            "string" => Some(Self::String),
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            "boolean" | "bool" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds a date literal for `instant`.
#[must_use]
pub fn date_value(instant: DateTime<Utc>) -> Value {
    let mut map = Map::new();
    map.insert(
        DATE_KEY.to_string(),
        Value::String(instant.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    Value::Object(map)
}

/// Returns the instant held by a date literal.
#[must_use]
pub fn as_date(value: &Value) -> Option<DateTime<FixedOffset>> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    let text = map.get(DATE_KEY)?.as_str()?;
    DateTime::parse_from_rfc3339(text).ok()
}

/// Returns the current time as an RFC 3339 UTC string with millisecond precision.
#[must_use]
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Looks up a dotted field path.
///
/// A missing segment yields `None`. Numeric segments index into arrays.
#[must_use]
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Sets a dotted field path, creating intermediate objects.
///
/// Returns `false` when an intermediate segment holds a non-object value.
pub fn set_path(doc: &mut Document, path: &str, value: Value) -> bool {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
            true
        }
        Some((head, rest)) => {
            let child = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match child {
                Value::Object(map) => set_path(map, rest, value),
                _ => false,
            }
        }
    }
}

/// Removes a dotted field path, returning the removed value.
pub fn remove_path(doc: &mut Document, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => doc.shift_remove(path),
        Some((head, rest)) => match doc.get_mut(head)? {
            Value::Object(map) => remove_path(map, rest),
            _ => None,
        },
    }
}

/// A number widened without loss: every `i64` and `u64` fits in `i128`.
#[derive(Clone, Copy)]
enum Exact {
    Int(i128),
    Float(f64),
}

impl Exact {
    fn of(n: &Number) -> Self {
        if let Some(i) = n.as_i64() {
            Self::Int(i128::from(i))
        } else if let Some(u) = n.as_u64() {
            Self::Int(i128::from(u))
        } else {
            Self::Float(n.as_f64().unwrap_or(f64::NAN))
        }
    }
}

/// 2^127, the first float past the `i128` range.
const I128_LIMIT: f64 = 170_141_183_460_469_231_731_687_303_715_884_105_728.0;

/// Compares an integer with a float without rounding the integer.
fn compare_int_float(i: i128, f: f64) -> Ordering {
    if f.is_nan() {
        return Ordering::Equal;
    }
    if f >= I128_LIMIT {
        return Ordering::Less;
    }
    if f < -I128_LIMIT {
        return Ordering::Greater;
    }
    let floor = f.floor();
    // `floor` is integral and inside the i128 range, so the cast is exact.
    match i.cmp(&(floor as i128)) {
        Ordering::Equal if f > floor => Ordering::Less,
        ord => ord,
    }
}

/// Compares two numbers by exact value.
fn compare_numbers(a: &Number, b: &Number) -> Ordering {
    match (Exact::of(a), Exact::of(b)) {
        (Exact::Int(x), Exact::Int(y)) => x.cmp(&y),
        (Exact::Int(x), Exact::Float(y)) => compare_int_float(x, y),
        (Exact::Float(x), Exact::Int(y)) => compare_int_float(y, x).reverse(),
        (Exact::Float(x), Exact::Float(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

/// Total order over document values.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (ta, tb) = (ValueType::of(a), ValueType::of(b));
    if ta != tb {
        return ta.cmp(&tb);
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y) {
                let ord = compare_values(left, right);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(_), Value::Object(_)) if ta == ValueType::Date => {
            match (as_date(a), as_date(b)) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => Ordering::Equal,
            }
        }
        (Value::Object(_), Value::Object(_)) => canonical_json(a).cmp(&canonical_json(b)),
        _ => Ordering::Equal,
    }
}

/// Orders optional values, with a missing value first.
#[must_use]
pub fn compare_optional(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare_values(x, y),
    }
}

/// Structural equality: numbers by value, object keys in any order, dates by instant.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Ordering::Equal,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            if let (Some(l), Some(r)) = (as_date(a), as_date(b)) {
                return l == r;
            }
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

/// Structural equality over whole documents.
#[must_use]
pub fn documents_equal(a: &Document, b: &Document) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
}

/// Text form of a number; equal numbers always get the same text.
fn number_text(n: &Number) -> String {
    match Exact::of(n) {
        Exact::Int(i) => i.to_string(),
        // Integral floats share a key with the equal integer.
        Exact::Float(f) if f.fract() == 0.0 && f.abs() < I128_LIMIT => (f as i128).to_string(),
        Exact::Float(f) => format!("{f}"),
    }
}

/// Serializes a value with sorted object keys and normalized numbers.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Number(n) => out.push_str(&number_text(n)),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Converts a value into a disambiguated index key.
///
/// Every type class gets its own tag so that `1`, `"1"` and `true`
/// never collide. Arrays share the `object` tag.
#[must_use]
pub fn normalize_key(value: &Value) -> String {
    match value {
        Value::Null => "null:".to_string(),
        Value::Bool(b) => format!("boolean:{b}"),
        Value::Number(n) => format!("number:{}", number_text(n)),
        Value::String(s) => format!("string:{s}"),
        Value::Object(_) => match as_date(value) {
            Some(instant) => format!(
                "date:{}",
                instant
                    .with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
            None => format!("object:{}", canonical_json(value)),
        },
        Value::Array(_) => format!("object:{}", canonical_json(value)),
    }
}

/// Recovers a comparable value from an index key.
#[must_use]
pub fn denormalize_key(key: &str) -> Value {
    let Some((tag, body)) = key.split_once(':') else {
        return Value::String(key.to_string());
    };
    match tag {
        "null" => Value::Null,
        "boolean" => Value::Bool(body == "true"),
        "number" => body
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| body.parse::<u64>().map(Value::from))
            .ok()
            .or_else(|| {
                body.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
            })
            .unwrap_or_else(|| Value::String(body.to_string())),
        "date" => {
            let mut map = Map::new();
            map.insert(DATE_KEY.to_string(), Value::String(body.to_string()));
            Value::Object(map)
        }
        "object" => serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())),
        "string" => Value::String(body.to_string()),
        _ => Value::String(key.to_string()),
    }
}
