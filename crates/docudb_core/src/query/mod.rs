//! Query engine.
//!
//! Filters are documents in the familiar operator syntax:
//!
//! | Group      | Operators                                   |
//! |------------|---------------------------------------------|
//! | comparison | `$eq $ne $gt $gte $lt $lte $in $nin`        |
//! | logical    | `$and $or $not $nor`                        |
//! | element    | `$exists $type`                             |
//! | string     | `$regex` (with `$options`)                  |
//! | array      | `$all $elemMatch $size`                     |
//!
//! A bare value under a field means `$eq`; dotted field names address
//! nested values. Any other `$` key aborts the query with
//! [`QueryError::UnsupportedOperator`].

mod engine;
mod error;
mod filter;
mod operator;
mod options;

pub use engine::{scan, QueryEngine, QueryPlan};
pub use error::{QueryError, QueryResult};
pub use filter::{parse_conditions, Condition, ElemMatch, Filter};
pub use operator::Operator;
pub use options::{FindOptions, Projection, SortKey, SortOrder};
