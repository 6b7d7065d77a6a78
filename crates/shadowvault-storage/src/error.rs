//! Storage error types.
//!
//! Every error variant carries enough context to diagnose the problem
//! without a debugger. Values (ciphertext) never appear in error messages.

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to open the store at the given location.
    #[error("failed to open storage at '{path}': {reason}")]
    Open { path: String, reason: String },

    /// Failed to read a row.
    #[error("failed to read {what}: {reason}")]
    Read { what: String, reason: String },

    /// Failed to write a row.
    #[error("failed to write {what}: {reason}")]
    Write { what: String, reason: String },

    /// Failed to delete a row.
    #[error("failed to delete {what}: {reason}")]
    Delete { what: String, reason: String },

    /// Failed to list rows.
    #[error("failed to list {what}: {reason}")]
    List { what: String, reason: String },

    /// Failed to begin or commit a transaction.
    #[error("transaction failed: {reason}")]
    Transaction { reason: String },

    /// A uniqueness constraint rejected the write.
    ///
    /// Raised when two writers race to create the same vault or a second
    /// real vault. Callers recover by re-reading, never by surfacing it.
    #[error("unique constraint violated: {constraint}")]
    Conflict { constraint: String },

    /// A row exists but its related rows are inconsistent.
    #[error("inconsistent state for vault {vault_id}: {reason}")]
    Inconsistent { vault_id: i64, reason: String },
}

impl StorageError {
    /// Whether this error is a uniqueness conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
