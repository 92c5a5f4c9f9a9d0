//! Ledger record types and the hash-chain computation
//!
//! Mirrors the append-only event shape in the teacher's
//! `coordinator::persistence::PersistedEvent`, with a hash chain added so
//! records become tamper-evident (SPEC_FULL §4.6, §8 scenario 6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of audited event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    OrchestratorDecision,
    WorkerExecution,
    MemoryWrite,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::OrchestratorDecision => write!(f, "OrchestratorDecision"),
            RecordKind::WorkerExecution => write!(f, "WorkerExecution"),
            RecordKind::MemoryWrite => write!(f, "MemoryWrite"),
        }
    }
}

/// Fields supplied by the caller to append a new record; the chain id and
/// timestamp are computed by the ledger, not the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDraft {
    pub kind: RecordKind,
    pub task_id: String,
    pub inputs_digest: String,
    pub outputs_digest: String,
    pub actor_id: String,
    /// Derived cost estimate in USD, for `WorkerExecution` records only
    /// (§10.7). `None` for records with no associated LLM call.
    pub cost_usd: Option<f64>,
}

/// An immutable, hash-chained ledger record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// hash(prev_id ∥ serialized fields)
    pub id: String,
    pub prev_id: String,
    pub kind: RecordKind,
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    pub inputs_digest: String,
    pub outputs_digest: String,
    pub actor_id: String,
    pub cost_usd: Option<f64>,
}

impl LedgerRecord {
    /// Build and chain a new record on top of `prev_id`, at the given timestamp.
    ///
    /// Timestamp is an explicit parameter (not `Utc::now()`) so construction stays
    /// deterministic and testable; callers supply the current time.
    pub fn chain(prev_id: &str, draft: RecordDraft, timestamp: DateTime<Utc>) -> Self {
        let mut record = LedgerRecord {
            id: String::new(),
            prev_id: prev_id.to_string(),
            kind: draft.kind,
            task_id: draft.task_id,
            timestamp,
            inputs_digest: draft.inputs_digest,
            outputs_digest: draft.outputs_digest,
            actor_id: draft.actor_id,
            cost_usd: draft.cost_usd,
        };
        record.id = record.compute_id();
        record
    }

    /// Recompute the chain id for this record's fields (excluding `id` itself).
    ///
    /// Used both at construction time and by `Verify` to detect tampering.
    pub fn compute_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.prev_id.as_bytes());
        hasher.update(self.kind.to_string().as_bytes());
        hasher.update(self.task_id.as_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        hasher.update(self.inputs_digest.as_bytes());
        hasher.update(self.outputs_digest.as_bytes());
        hasher.update(self.actor_id.as_bytes());
        match self.cost_usd {
            Some(cost) => hasher.update(cost.to_bits().to_le_bytes()),
            None => hasher.update(b"no-cost"),
        }
        hex::encode(hasher.finalize())
    }

    /// True if the stored id matches the hash of the stored fields.
    pub fn is_self_consistent(&self) -> bool {
        self.id == self.compute_id()
    }
}

/// Digest helper: hash arbitrary caller-supplied content for `inputs_digest`/`outputs_digest`.
pub fn digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> RecordDraft {
        RecordDraft {
            kind: RecordKind::OrchestratorDecision,
            task_id: "t1".to_string(),
            inputs_digest: digest(b"in"),
            outputs_digest: digest(b"out"),
            actor_id: "orchestrator".to_string(),
            cost_usd: None,
        }
    }

    #[test]
    fn chained_record_is_self_consistent() {
        let ts = Utc::now();
        let record = LedgerRecord::chain("genesis", draft(), ts);
        assert!(record.is_self_consistent());
    }

    #[test]
    fn tampering_breaks_self_consistency() {
        let ts = Utc::now();
        let mut record = LedgerRecord::chain("genesis", draft(), ts);
        record.outputs_digest = digest(b"tampered");
        assert!(!record.is_self_consistent());
    }

    #[test]
    fn same_inputs_produce_same_id() {
        let ts = Utc::now();
        let a = LedgerRecord::chain("genesis", draft(), ts);
        let b = LedgerRecord::chain("genesis", draft(), ts);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn different_prev_id_changes_chain_id() {
        let ts = Utc::now();
        let a = LedgerRecord::chain("genesis-a", draft(), ts);
        let b = LedgerRecord::chain("genesis-b", draft(), ts);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn differing_cost_changes_chain_id() {
        let ts = Utc::now();
        let a = LedgerRecord::chain("genesis", draft(), ts);
        let mut with_cost = draft();
        with_cost.cost_usd = Some(0.0042);
        let b = LedgerRecord::chain("genesis", with_cost, ts);
        assert_ne!(a.id, b.id);
    }
}
