//! Options and results of collection mutations.

/// Options for `update`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Maximum number of documents to update.
    pub limit: Option<usize>,
}

impl UpdateOptions {
    /// Limits the update to `limit` matches.
    #[must_use]
    pub fn limit(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }
}

/// Options for `delete`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Maximum number of documents to delete.
    pub limit: Option<usize>,
}

impl DeleteOptions {
    /// Limits the delete to `limit` matches.
    #[must_use]
    pub fn limit(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }
}

/// Outcome of an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Documents that matched the filter (within the limit).
    pub matched: usize,
    /// Documents whose contents changed.
    pub modified: usize,
}

/// Outcome of a delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    /// Documents removed.
    pub deleted: usize,
}
