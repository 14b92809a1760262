//! Query errors.

use thiserror::Error;

/// Result type for filter parsing.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while parsing a filter or query options.
///
/// Any of these aborts the whole query; no partial results are returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The operator is not part of the supported set.
    #[error("unsupported operator: {operator}")]
    UnsupportedOperator {
        /// The operator as written.
        operator: String,
    },

    /// The operator's operand has the wrong shape.
    #[error("invalid operand for {operator}: {message}")]
    InvalidOperand {
        /// The operator.
        operator: String,
        /// What was wrong.
        message: String,
    },

    /// A `$regex` pattern or `$options` flag is invalid.
    #[error("invalid regex {pattern:?}: {message}")]
    InvalidRegex {
        /// The pattern.
        pattern: String,
        /// Compiler message.
        message: String,
    },

    /// The filter or options document is malformed.
    #[error("invalid filter: {message}")]
    InvalidFilter {
        /// What was wrong.
        message: String,
    },
}

impl QueryError {
    /// Creates an unsupported operator error.
    pub fn unsupported(operator: impl Into<String>) -> Self {
        Self::UnsupportedOperator {
            operator: operator.into(),
        }
    }

    /// Creates an invalid operand error.
    pub fn invalid_operand(operator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOperand {
            operator: operator.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid filter error.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }
}
