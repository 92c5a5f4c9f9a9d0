//! Hash-chained, content-addressed audit ledger.
//!
//! Every decision the orchestrator makes, every worker execution it dispatches,
//! and every project-memory write is appended here as a `LedgerRecord` chained
//! onto the previous record's id, so tampering with any record breaks the chain
//! from that point forward (`Ledger::verify`).

pub mod error;
pub mod record;
pub mod store;

pub use error::LedgerError;
pub use record::{digest, LedgerRecord, RecordDraft, RecordKind};
pub use store::Ledger;
