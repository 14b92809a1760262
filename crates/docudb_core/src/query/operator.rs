//! The closed set of query operators.

use std::fmt;

/// Every operator the query engine understands.
///
/// Parsing an operator name outside this set is an error; there is no
/// dynamic registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `$eq`
    Eq,
    /// `$ne`
    Ne,
    /// `$gt`
    Gt,
    /// `$gte`
    Gte,
    /// `$lt`
    Lt,
    /// `$lte`
    Lte,
    /// `$in`
    In,
    /// `$nin`
    Nin,
    /// `$and`
    And,
    /// `$or`
    Or,
    /// `$not`
    Not,
    /// `$nor`
    Nor,
    /// `$exists`
    Exists,
    /// `$type`
    Type,
    /// `$regex`
    Regex,
    /// `$options`, only valid next to `$regex`
    Options,
    /// `$all`
    All,
    /// `$elemMatch`
    ElemMatch,
    /// `$size`
    Size,
}

impl Operator {
    /// Prefix shared by all operator names.
    pub const MARKER: char = '$';

    /// Parses an operator name including its `$` prefix.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let op = match name {
            "$eq" => Self::Eq,
            "$ne" => Self::Ne,
            "$gt" => Self::Gt,
            "$gte" => Self::Gte,
            "$lt" => Self::Lt,
            "$lte" => Self::Lte,
            "$in" => Self::In,
            "$nin" => Self::Nin,
            "$and" => Self::And,
            "$or" => Self::Or,
            "$not" => Self::Not,
            "$nor" => Self::Nor,
            "$exists" => Self::Exists,
            "$type" => Self::Type,
            "$regex" => Self::Regex,
            "$options" => Self::Options,
            "$all" => Self::All,
            "$elemMatch" => Self::ElemMatch,
            "$size" => Self::Size,
            _ => return None,
        };
        Some(op)
    }

    /// Returns the operator name including its `$` prefix.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::In => "$in",
            Self::Nin => "$nin",
            Self::And => "$and",
            Self::Or => "$or",
            Self::Not => "$not",
            Self::Nor => "$nor",
            Self::Exists => "$exists",
            Self::Type => "$type",
            Self::Regex => "$regex",
            Self::Options => "$options",
            Self::All => "$all",
            Self::ElemMatch => "$elemMatch",
            Self::Size => "$size",
        }
    }

    /// True for operators that combine sub-filters.
    #[must_use]
    pub const fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Not | Self::Nor)
    }

    /// True if `key` looks like an operator name.
    #[must_use]
    pub fn is_operator_key(key: &str) -> bool {
        key.starts_with(Self::MARKER)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
