//! Ledger error types

use thiserror::Error;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger integrity violation: expected previous id {expected}, found {actual}")]
    Integrity { expected: String, actual: String },

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LedgerError {
    /// Whether this error should terminate the owning process (§7: `Fatal`/`LedgerIntegrity`).
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::Integrity { .. })
    }
}
