//! Top-level error taxonomy (closed set, §7).
//!
//! Small `thiserror` leaf errors (`LlmError`, `IndexError`, `LedgerError`)
//! compose under this one at the application-call boundary, the same
//! layering the source repo uses for `eyre::Result<_, LlmError>` call sites.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("cancelled")]
    Cancelled,

    #[error("provider exhausted: {0}")]
    ProviderExhausted(String),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: std::time::Duration },

    #[error("transient upstream error: {0}")]
    TransientUpstream(String),

    #[error("ledger integrity violation: {0}")]
    LedgerIntegrity(String),

    #[error("index write conflict: {0}")]
    IndexConflict(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl FleetError {
    /// Exit code for CLI termination (§6): 0 success handled by caller,
    /// 1 config error, 2 runtime fatal, 3 integrity failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            FleetError::LedgerIntegrity(_) => 3,
            FleetError::Fatal(_) => 2,
            _ => 1,
        }
    }

    /// Whether this kind is recovered locally and must never surface to a
    /// caller (§7 propagation policy).
    pub fn is_internally_recovered(&self) -> bool {
        matches!(
            self,
            FleetError::RateLimited { .. } | FleetError::TransientUpstream(_) | FleetError::IndexConflict(_)
        )
    }

    /// Whether this kind terminates the process after flushing in-memory state.
    pub fn is_process_fatal(&self) -> bool {
        matches!(self, FleetError::LedgerIntegrity(_) | FleetError::Fatal(_))
    }
}

impl From<ledgerstore::LedgerError> for FleetError {
    fn from(err: ledgerstore::LedgerError) -> Self {
        match err {
            ledgerstore::LedgerError::Integrity { expected, actual } => {
                FleetError::LedgerIntegrity(format!("expected {expected}, found {actual}"))
            }
            ledgerstore::LedgerError::NotFound(id) => FleetError::NotFound(id),
            other => FleetError::Fatal(other.to_string()),
        }
    }
}

impl From<contextstore::IndexError> for FleetError {
    fn from(err: contextstore::IndexError) -> Self {
        match err {
            contextstore::IndexError::NotFound(id) => FleetError::NotFound(id),
            contextstore::IndexError::AlreadyExists(id) => FleetError::AlreadyExists(id),
            contextstore::IndexError::Conflict(id) => FleetError::IndexConflict(id),
            contextstore::IndexError::InvalidInput(msg) => FleetError::InvalidInput(msg),
            other => FleetError::Fatal(other.to_string()),
        }
    }
}

impl From<crate::llm::LlmError> for FleetError {
    fn from(err: crate::llm::LlmError) -> Self {
        if let Some(retry_after) = err.retry_after() {
            return FleetError::RateLimited { retry_after };
        }
        if err.is_retryable() {
            FleetError::TransientUpstream(err.to_string())
        } else {
            FleetError::InvalidInput(err.to_string())
        }
    }
}

impl From<eyre::Report> for FleetError {
    fn from(err: eyre::Report) -> Self {
        FleetError::Fatal(err.to_string())
    }
}
