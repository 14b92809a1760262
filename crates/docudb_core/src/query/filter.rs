//! Filter trees.
//!
//! A filter document is parsed once into a [`Filter`] and then evaluated
//! against any number of documents. Parsing is where unsupported
//! operators and malformed operands are rejected; evaluation never fails.
//!
//! ```text
//! {"age": {"$gte": 30}, "$or": [{"city": "Oslo"}, {"city": "Bergen"}]}
//!   => And[ Field(age, [Gte 30]), Or[ Field(city, [Eq "Oslo"]), Field(city, [Eq "Bergen"]) ] ]
//! ```

use super::error::{QueryError, QueryResult};
use super::operator::Operator;
use docudb_codec::{as_date, compare_values, get_path, values_equal, Document, ValueType};
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A parsed filter.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Every sub-filter matches. An empty list matches everything.
    And(Vec<Filter>),
    /// At least one sub-filter matches.
    Or(Vec<Filter>),
    /// No sub-filter matches.
    Nor(Vec<Filter>),
    /// The sub-filter does not match.
    Not(Box<Filter>),
    /// Conditions on one field path, implicitly ANDed.
    Field {
        /// Dotted field path.
        path: String,
        /// Conditions the field value must satisfy.
        conditions: Vec<Condition>,
    },
}

/// A test applied to a single field value.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Equal to the operand.
    Eq(Value),
    /// Missing or not equal to the operand.
    Ne(Value),
    /// Greater than an operand of the same type class.
    Gt(Value),
    /// Greater than or equal to an operand of the same type class.
    Gte(Value),
    /// Less than an operand of the same type class.
    Lt(Value),
    /// Less than or equal to an operand of the same type class.
    Lte(Value),
    /// Equal to one of the operands.
    In(Vec<Value>),
    /// Missing or equal to none of the operands.
    Nin(Vec<Value>),
    /// Present (`true`) or missing (`false`).
    Exists(bool),
    /// Of the given type class.
    Type(ValueType),
    /// A string matching the pattern.
    Regex(Regex),
    /// An array containing every operand.
    All(Vec<Value>),
    /// An array with at least one matching element.
    ElemMatch(ElemMatch),
    /// An array of exactly this length.
    Size(usize),
    /// The conditions do not all hold.
    Not(Vec<Condition>),
}

/// Element test of `$elemMatch`.
#[derive(Debug, Clone)]
pub enum ElemMatch {
    /// Operator conditions applied to each element.
    Conditions(Vec<Condition>),
    /// A sub-filter applied to each object element.
    Filter(Box<Filter>),
}

impl Default for Filter {
    fn default() -> Self {
        Self::all()
    }
}

impl Filter {
    /// A filter that matches every document.
    #[must_use]
    pub const fn all() -> Self {
        Self::And(Vec::new())
    }

    /// Parses a filter document.
    ///
    /// `null` is treated as the empty filter.
    pub fn parse(value: &Value) -> QueryResult<Self> {
        match value {
            Value::Object(map) => Self::parse_map(map),
            Value::Null => Ok(Self::all()),
            other => Err(QueryError::invalid_filter(format!(
                "filter must be an object, found {}",
                ValueType::of(other)
            ))),
        }
    }

    /// Parses a filter from an object.
    pub fn parse_map(map: &Map<String, Value>) -> QueryResult<Self> {
        let mut clauses = Vec::with_capacity(map.len());
        for (key, value) in map {
            clauses.push(parse_clause(key, value)?);
        }
        if clauses.len() == 1 {
            if let Some(clause) = clauses.pop() {
                return Ok(clause);
            }
        }
        Ok(Self::And(clauses))
    }

    /// Returns true if `doc` satisfies the filter.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Self::Nor(filters) => !filters.iter().any(|f| f.matches(doc)),
            Self::Not(filter) => !filter.matches(doc),
            Self::Field { path, conditions } => {
                let value = get_path(doc, path);
                conditions.iter().all(|c| c.test(value))
            }
        }
    }

    /// Field clauses that must all hold for a document to match.
    ///
    /// These are the top-level field conditions, the only ones an index
    /// can answer on its own.
    #[must_use]
    pub fn required_fields(&self) -> Vec<(&str, &[Condition])> {
        match self {
            Self::Field { path, conditions } => vec![(path.as_str(), conditions.as_slice())],
            Self::And(filters) => filters
                .iter()
                .filter_map(|f| match f {
                    Self::Field { path, conditions } => {
                        Some((path.as_str(), conditions.as_slice()))
                    }
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn parse_clause(key: &str, value: &Value) -> QueryResult<Filter> {
    if !Operator::is_operator_key(key) {
        return Ok(Filter::Field {
            path: key.to_string(),
            conditions: parse_conditions(value)?,
        });
    }
    match Operator::parse(key) {
        Some(op @ (Operator::And | Operator::Or | Operator::Nor)) => {
            let items = value.as_array().ok_or_else(|| {
                QueryError::invalid_operand(op.name(), "expected an array of filters")
            })?;
            if items.is_empty() {
                return Err(QueryError::invalid_operand(op.name(), "array must not be empty"));
            }
            let filters = items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => Filter::parse_map(map),
                    _ => Err(QueryError::invalid_operand(op.name(), "expected a filter object")),
                })
                .collect::<QueryResult<Vec<_>>>()?;
            Ok(match op {
                Operator::And => Filter::And(filters),
                Operator::Or => Filter::Or(filters),
                _ => Filter::Nor(filters),
            })
        }
        Some(Operator::Not) => match value {
            Value::Object(map) => Ok(Filter::Not(Box::new(Filter::parse_map(map)?))),
            _ => Err(QueryError::invalid_operand("$not", "expected a filter object")),
        },
        Some(op) => Err(QueryError::invalid_filter(format!(
            "{op} must be applied to a field"
        ))),
        None => Err(QueryError::unsupported(key)),
    }
}

fn is_operator_map(map: &Map<String, Value>) -> QueryResult<bool> {
    let operators = map.keys().filter(|k| Operator::is_operator_key(k)).count();
    if operators == 0 {
        return Ok(false);
    }
    if operators != map.len() {
        return Err(QueryError::invalid_filter(
            "cannot mix operators and field names in one condition",
        ));
    }
    Ok(true)
}

/// Parses the condition written under a field name.
///
/// A literal (including a `{"$date": ...}` literal) means equality.
pub fn parse_conditions(value: &Value) -> QueryResult<Vec<Condition>> {
    match value {
        Value::Object(map) if as_date(value).is_none() && is_operator_map(map)? => {
            parse_operator_map(map)
        }
        literal => Ok(vec![Condition::Eq(literal.clone())]),
    }
}

fn parse_operator_map(map: &Map<String, Value>) -> QueryResult<Vec<Condition>> {
    let options = map.get(Operator::Options.name());
    if options.is_some() && !map.contains_key(Operator::Regex.name()) {
        return Err(QueryError::invalid_operand("$options", "requires $regex"));
    }

    let mut conditions = Vec::with_capacity(map.len());
    for (key, operand) in map {
        let op = Operator::parse(key).ok_or_else(|| QueryError::unsupported(key))?;
        let condition = match op {
            Operator::Eq => Condition::Eq(operand.clone()),
            Operator::Ne => Condition::Ne(operand.clone()),
            Operator::Gt => Condition::Gt(operand.clone()),
            Operator::Gte => Condition::Gte(operand.clone()),
            Operator::Lt => Condition::Lt(operand.clone()),
            Operator::Lte => Condition::Lte(operand.clone()),
            Operator::In => Condition::In(array_operand(op, operand)?),
            Operator::Nin => Condition::Nin(array_operand(op, operand)?),
            Operator::All => Condition::All(array_operand(op, operand)?),
            Operator::Exists => Condition::Exists(match operand {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                _ => return Err(QueryError::invalid_operand(op.name(), "expected a boolean")),
            }),
            Operator::Type => {
                let name = operand
                    .as_str()
                    .ok_or_else(|| QueryError::invalid_operand(op.name(), "expected a type name"))?;
                let ty = ValueType::from_name(name).ok_or_else(|| {
                    QueryError::invalid_operand(op.name(), format!("unknown type '{name}'"))
                })?;
                Condition::Type(ty)
            }
            Operator::Size => {
                let size = operand
                    .as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| {
                        QueryError::invalid_operand(op.name(), "expected a non-negative integer")
                    })?;
                Condition::Size(size)
            }
            Operator::Regex => Condition::Regex(build_regex(operand, options)?),
            Operator::Options => continue,
            Operator::ElemMatch => Condition::ElemMatch(parse_elem_match(operand)?),
            Operator::Not => Condition::Not(match operand {
                Value::Object(inner) if is_operator_map(inner)? => parse_operator_map(inner)?,
                Value::String(_) => vec![Condition::Regex(build_regex(operand, None)?)],
                _ => {
                    return Err(QueryError::invalid_operand(
                        op.name(),
                        "expected an operator object or a pattern",
                    ))
                }
            }),
            Operator::And | Operator::Or | Operator::Nor => {
                return Err(QueryError::invalid_filter(format!(
                    "{op} cannot be applied to a field"
                )))
            }
        };
        conditions.push(condition);
    }
    Ok(conditions)
}

fn array_operand(op: Operator, operand: &Value) -> QueryResult<Vec<Value>> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| QueryError::invalid_operand(op.name(), "expected an array"))
}

fn build_regex(pattern: &Value, options: Option<&Value>) -> QueryResult<Regex> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| QueryError::invalid_operand("$regex", "expected a string pattern"))?;
    let flags = match options {
        None => "",
        Some(Value::String(flags)) => flags.as_str(),
        Some(_) => return Err(QueryError::invalid_operand("$options", "expected a string")),
    };

    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(QueryError::InvalidRegex {
                    pattern: pattern.to_string(),
                    message: format!("unknown option '{other}'"),
                })
            }
        };
    }
    builder.build().map_err(|err| QueryError::InvalidRegex {
        pattern: pattern.to_string(),
        message: err.to_string(),
    })
}

fn parse_elem_match(operand: &Value) -> QueryResult<ElemMatch> {
    match operand {
        Value::Object(map) if is_operator_map(map)? => {
            Ok(ElemMatch::Conditions(parse_operator_map(map)?))
        }
        Value::Object(map) => Ok(ElemMatch::Filter(Box::new(Filter::parse_map(map)?))),
        _ => Err(QueryError::invalid_operand("$elemMatch", "expected an object")),
    }
}

fn range(value: Option<&Value>, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    value.is_some_and(|v| {
        ValueType::of(v) == ValueType::of(operand) && accept(compare_values(v, operand))
    })
}

fn equals(value: Option<&Value>, operand: &Value) -> bool {
    value.is_some_and(|v| values_equal(v, operand))
}

impl Condition {
    /// Tests a field value; `None` means the field is missing.
    #[must_use]
    pub fn test(&self, value: Option<&Value>) -> bool {
        match self {
            Self::Eq(operand) => equals(value, operand),
            Self::Ne(operand) => !equals(value, operand),
            Self::Gt(operand) => range(value, operand, Ordering::is_gt),
            Self::Gte(operand) => range(value, operand, Ordering::is_ge),
            Self::Lt(operand) => range(value, operand, Ordering::is_lt),
            Self::Lte(operand) => range(value, operand, Ordering::is_le),
            Self::In(operands) => operands.iter().any(|o| equals(value, o)),
            Self::Nin(operands) => !operands.iter().any(|o| equals(value, o)),
            Self::Exists(expected) => value.is_some() == *expected,
            Self::Type(ty) => value.is_some_and(|v| ValueType::of(v) == *ty),
            Self::Regex(re) => matches!(value, Some(Value::String(s)) if re.is_match(s)),
            Self::All(operands) => match value {
                Some(Value::Array(items)) => operands
                    .iter()
                    .all(|o| items.iter().any(|item| values_equal(item, o))),
                _ => false,
            },
            Self::ElemMatch(elem) => match value {
                Some(Value::Array(items)) => items.iter().any(|item| elem.test(item)),
                _ => false,
            },
            Self::Size(size) => matches!(value, Some(Value::Array(items)) if items.len() == *size),
            Self::Not(conditions) => !conditions.iter().all(|c| c.test(value)),
        }
    }
}

impl ElemMatch {
    fn test(&self, item: &Value) -> bool {
        match self {
            Self::Conditions(conditions) => conditions.iter().all(|c| c.test(Some(item))),
            Self::Filter(filter) => item.as_object().is_some_and(|obj| filter.matches(obj)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn matches(filter: Value, d: &Document) -> bool {
        Filter::parse(&filter).unwrap().matches(d)
    }

    fn person() -> Document {
        doc(json!({
            "_id": "p1",
            "name": "Alice",
            "age": 30,
            "address": {"city": "Oslo", "zip": "0150"},
            "tags": ["admin", "dev"],
            "scores": [3, 8, 12],
            "pets": [{"kind": "cat", "age": 4}, {"kind": "dog", "age": 9}],
            "nickname": null,
            "joined": {"$date": "2021-03-04T05:06:07.000Z"}
        }))
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches(json!({}), &person()));
        assert!(matches(json!(null), &person()));
    }

    #[test]
    fn bare_value_means_equality() {
        let p = person();
        assert!(matches(json!({"name": "Alice"}), &p));
        assert!(matches(json!({"age": 30.0}), &p));
        assert!(!matches(json!({"age": "30"}), &p));
        assert!(matches(json!({"address": {"zip": "0150", "city": "Oslo"}}), &p));
    }

    #[test]
    fn comparison_operators() {
        let p = person();
        assert!(matches(json!({"age": {"$gt": 29, "$lt": 31}}), &p));
        assert!(matches(json!({"age": {"$gte": 30, "$lte": 30}}), &p));
        assert!(!matches(json!({"age": {"$gt": 30}}), &p));
        assert!(matches(json!({"age": {"$ne": 31}}), &p));
        assert!(matches(json!({"age": {"$in": [1, 30]}}), &p));
        assert!(matches(json!({"age": {"$nin": [1, 2]}}), &p));
        assert!(matches(json!({"age": {"$eq": 30}}), &p));
    }

    #[test]
    fn range_requires_same_type_class() {
        let p = person();
        assert!(!matches(json!({"name": {"$gt": 5}}), &p));
        assert!(!matches(json!({"age": {"$lt": "zzz"}}), &p));
        assert!(matches(json!({"name": {"$gt": "Aa"}}), &p));
    }

    #[test]
    fn missing_fields_and_null() {
        let p = person();
        assert!(matches(json!({"nickname": null}), &p));
        assert!(!matches(json!({"missing": null}), &p));
        assert!(matches(json!({"missing": {"$ne": 1}}), &p));
        assert!(matches(json!({"missing": {"$nin": [1]}}), &p));
        assert!(!matches(json!({"missing": {"$gt": 1}}), &p));
        assert!(matches(json!({"missing": {"$exists": false}}), &p));
        assert!(matches(json!({"nickname": {"$exists": true}}), &p));
        assert!(matches(json!({"address.country.code": {"$exists": false}}), &p));
    }

    #[test]
    fn dotted_paths() {
        let p = person();
        assert!(matches(json!({"address.city": "Oslo"}), &p));
        assert!(matches(json!({"pets.1.kind": "dog"}), &p));
        assert!(!matches(json!({"address.city.name": "Oslo"}), &p));
    }

    #[test]
    fn logical_operators() {
        let p = person();
        assert!(matches(json!({"$or": [{"age": 1}, {"name": "Alice"}]}), &p));
        assert!(!matches(json!({"$and": [{"age": 30}, {"name": "Bob"}]}), &p));
        assert!(matches(json!({"$nor": [{"age": 1}, {"name": "Bob"}]}), &p));
        assert!(matches(json!({"$not": {"name": "Bob"}}), &p));
        assert!(matches(
            json!({"$and": [
                {"$or": [{"age": 30}, {"age": 40}]},
                {"$not": {"tags": {"$size": 0}}}
            ]}),
            &p
        ));
    }

    #[test]
    fn field_level_not() {
        let p = person();
        assert!(matches(json!({"age": {"$not": {"$gt": 40}}}), &p));
        assert!(!matches(json!({"age": {"$not": {"$gt": 20}}}), &p));
        assert!(matches(json!({"name": {"$not": "^B"}}), &p));
    }

    #[test]
    fn element_operators() {
        let p = person();
        assert!(matches(json!({"tags": {"$type": "array"}}), &p));
        assert!(matches(json!({"address": {"$type": "object"}}), &p));
        assert!(matches(json!({"joined": {"$type": "date"}}), &p));
        assert!(matches(json!({"nickname": {"$type": "null"}}), &p));
        assert!(!matches(json!({"age": {"$type": "string"}}), &p));
    }

    #[test]
    fn regex_operator() {
        let p = person();
        assert!(matches(json!({"name": {"$regex": "^Al"}}), &p));
        assert!(!matches(json!({"name": {"$regex": "^al"}}), &p));
        assert!(matches(json!({"name": {"$regex": "^al", "$options": "i"}}), &p));
        assert!(!matches(json!({"age": {"$regex": "3"}}), &p));
    }

    #[test]
    fn array_operators() {
        let p = person();
        assert!(matches(json!({"tags": {"$all": ["dev", "admin"]}}), &p));
        assert!(!matches(json!({"tags": {"$all": ["dev", "ops"]}}), &p));
        assert!(matches(json!({"tags": {"$size": 2}}), &p));
        assert!(matches(json!({"scores": {"$elemMatch": {"$gt": 10, "$lt": 13}}}), &p));
        assert!(!matches(json!({"scores": {"$elemMatch": {"$gt": 12}}}), &p));
        assert!(matches(
            json!({"pets": {"$elemMatch": {"kind": "dog", "age": {"$gte": 9}}}}),
            &p
        ));
        assert!(!matches(
            json!({"pets": {"$elemMatch": {"kind": "cat", "age": {"$gte": 9}}}}),
            &p
        ));
    }

    #[test]
    fn dates_compare_by_instant() {
        let p = person();
        assert!(matches(json!({"joined": {"$gt": {"$date": "2020-01-01T00:00:00Z"}}}), &p));
        assert!(matches(json!({"joined": {"$date": "2021-03-04T06:06:07+01:00"}}), &p));
        assert!(!matches(json!({"joined": {"$gt": "2020"}}), &p));
    }

    #[test]
    fn unsupported_operators_abort() {
        let err = Filter::parse(&json!({"age": {"$near": 3}})).unwrap_err();
        assert_eq!(err, QueryError::unsupported("$near"));
        let err = Filter::parse(&json!({"$where": "1"})).unwrap_err();
        assert_eq!(err, QueryError::unsupported("$where"));
        let err = Filter::parse(&json!({"$or": [{"a": {"$bogus": 1}}]})).unwrap_err();
        assert_eq!(err, QueryError::unsupported("$bogus"));
    }

    #[test]
    fn malformed_operands_abort() {
        for bad in [
            json!({"a": {"$in": 3}}),
            json!({"a": {"$size": -1}}),
            json!({"a": {"$type": "widget"}}),
            json!({"a": {"$regex": "("}}),
            json!({"a": {"$regex": "x", "$options": "q"}}),
            json!({"a": {"$options": "i"}}),
            json!({"a": {"$gt": 1, "b": 2}}),
            json!({"$or": []}),
            json!({"$or": {"a": 1}}),
            json!({"$gt": 1}),
            json!([1, 2]),
        ] {
            assert!(Filter::parse(&bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn required_fields_only_lists_top_level_conditions() {
        let filter =
            Filter::parse(&json!({"a": 1, "b": {"$gt": 2}, "$or": [{"c": 1}, {"d": 1}]})).unwrap();
        let fields: Vec<&str> = filter.required_fields().iter().map(|(f, _)| *f).collect();
        assert_eq!(fields, vec!["a", "b"]);

        let or = Filter::parse(&json!({"$or": [{"a": 1}]})).unwrap();
        assert!(or.required_fields().is_empty());
    }
}
