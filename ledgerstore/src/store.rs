//! Ledger persistence: SQLite for the ordered/random-access store and head
//! pointer, mirrored to an append-only JSONL log for the same durability
//! story the teacher's `taskstore` crate advertises ("SQLite+JSONL+Git
//! integration" — the Git half does not apply here, there is no working tree).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::error::LedgerError;
use crate::record::{LedgerRecord, RecordDraft, RecordKind};

fn kind_to_str(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::OrchestratorDecision => "OrchestratorDecision",
        RecordKind::WorkerExecution => "WorkerExecution",
        RecordKind::MemoryWrite => "MemoryWrite",
    }
}

fn kind_from_str(s: &str) -> Result<RecordKind, LedgerError> {
    match s {
        "OrchestratorDecision" => Ok(RecordKind::OrchestratorDecision),
        "WorkerExecution" => Ok(RecordKind::WorkerExecution),
        "MemoryWrite" => Ok(RecordKind::MemoryWrite),
        other => Err(LedgerError::NotFound(format!("unknown record kind: {other}"))),
    }
}

struct Inner {
    conn: Connection,
    jsonl_path: PathBuf,
    head: String,
}

/// The Audit Ledger: a hash-chained, content-addressed, append-only record store.
///
/// A process-wide singleton guarded by its own mutex (SPEC_FULL §5 "Shared
/// resource policy"); no cross-singleton lock is ever held while this is locked.
pub struct Ledger {
    inner: Mutex<Inner>,
    genesis_id: String,
}

impl Ledger {
    /// Open (creating if absent) a ledger rooted at `data_dir`, with the configured
    /// genesis id (`ledger.genesis_id`).
    pub fn open(data_dir: impl AsRef<Path>, genesis_id: impl Into<String>) -> Result<Self, LedgerError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let genesis_id = genesis_id.into();

        let conn = Connection::open(data_dir.join("chain.sqlite3"))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT UNIQUE NOT NULL,
                prev_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                task_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                inputs_digest TEXT NOT NULL,
                outputs_digest TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                cost_usd REAL
            );
            CREATE TABLE IF NOT EXISTS head (id INTEGER PRIMARY KEY CHECK (id = 0), record_id TEXT NOT NULL);",
        )?;

        let head: Option<String> = conn
            .query_row("SELECT record_id FROM head WHERE id = 0", [], |row| row.get(0))
            .optional()?;

        let head = match head {
            Some(h) => h,
            None => {
                conn.execute(
                    "INSERT INTO head (id, record_id) VALUES (0, ?1)",
                    params![genesis_id],
                )?;
                genesis_id.clone()
            }
        };

        let jsonl_path = data_dir.join("chain.log");
        info!(?data_dir, %head, "Ledger opened");

        Ok(Self {
            inner: Mutex::new(Inner { conn, jsonl_path, head }),
            genesis_id,
        })
    }

    /// Genesis id this ledger was configured with.
    pub fn genesis_id(&self) -> &str {
        &self.genesis_id
    }

    /// Current chain head (the id of the most recently appended record, or
    /// the genesis id if the ledger is empty).
    pub fn head(&self) -> String {
        self.inner.lock().unwrap().head.clone()
    }

    /// Append a new record on top of the current head.
    ///
    /// `expected_prev_id` lets a concurrent caller detect a lost race: if the
    /// stored head has moved since the caller last observed it, this fails with
    /// `LedgerError::Integrity` rather than silently rechaining (§4.6).
    pub fn append(&self, expected_prev_id: &str, draft: RecordDraft) -> Result<String, LedgerError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.head != expected_prev_id {
            warn!(expected = %expected_prev_id, actual = %inner.head, "ledger integrity mismatch on append");
            return Err(LedgerError::Integrity {
                expected: expected_prev_id.to_string(),
                actual: inner.head.clone(),
            });
        }

        let record = LedgerRecord::chain(&inner.head, draft, Utc::now());

        let tx = inner.conn.transaction()?;
        tx.execute(
            "INSERT INTO records (id, prev_id, kind, task_id, timestamp, inputs_digest, outputs_digest, actor_id, cost_usd)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                record.prev_id,
                kind_to_str(record.kind),
                record.task_id,
                record.timestamp.to_rfc3339(),
                record.inputs_digest,
                record.outputs_digest,
                record.actor_id,
                record.cost_usd,
            ],
        )?;
        tx.execute(
            "UPDATE head SET record_id = ?1 WHERE id = 0",
            params![record.id],
        )?;
        tx.commit()?;

        append_jsonl(&inner.jsonl_path, &record)?;

        debug!(id = %record.id, kind = %record.kind, "ledger record appended");
        inner.head = record.id.clone();
        Ok(record.id)
    }

    /// Append, auto-chaining on the current head. Convenience over `append`
    /// for callers that don't need the optimistic-concurrency check.
    pub fn append_auto(&self, draft: RecordDraft) -> Result<String, LedgerError> {
        let head = self.head();
        self.append(&head, draft)
    }

    /// Retrieve a single record by id.
    pub fn get(&self, id: &str) -> Result<LedgerRecord, LedgerError> {
        let inner = self.inner.lock().unwrap();
        row_to_record(&inner.conn, id)
    }

    /// Ordered list of records from `from_id` (exclusive) to `to_id` (inclusive).
    /// Pass the genesis id as `from_id` to start from the beginning.
    pub fn replay(&self, from_id: &str, to_id: &str) -> Result<Vec<LedgerRecord>, LedgerError> {
        let inner = self.inner.lock().unwrap();

        let from_seq: i64 = if from_id == self.genesis_id {
            0
        } else {
            inner
                .conn
                .query_row("SELECT seq FROM records WHERE id = ?1", params![from_id], |r| r.get(0))
                .map_err(|_| LedgerError::NotFound(from_id.to_string()))?
        };
        let to_seq: i64 = inner
            .conn
            .query_row("SELECT seq FROM records WHERE id = ?1", params![to_id], |r| r.get(0))
            .map_err(|_| LedgerError::NotFound(to_id.to_string()))?;

        let mut stmt = inner.conn.prepare(
            "SELECT id, prev_id, kind, task_id, timestamp, inputs_digest, outputs_digest, actor_id, cost_usd
             FROM records WHERE seq > ?1 AND seq <= ?2 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![from_seq, to_seq], row_to_record_fields)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Walk the chain from `from_id` to `to_id`, recomputing each record's id
    /// from its own fields and checking it matches both the stored id and the
    /// next record's `prev_id`. Returns false on any mismatch (§8 scenario 6).
    pub fn verify(&self, from_id: &str, to_id: &str) -> Result<bool, LedgerError> {
        let records = self.replay(from_id, to_id)?;
        let mut prev = from_id.to_string();

        for record in &records {
            if !record.is_self_consistent() {
                warn!(id = %record.id, "ledger record failed self-consistency check");
                return Ok(false);
            }
            if record.prev_id != prev {
                warn!(id = %record.id, expected_prev = %prev, actual_prev = %record.prev_id, "ledger chain broken");
                return Ok(false);
            }
            prev = record.id.clone();
        }

        Ok(true)
    }
}

fn append_jsonl(path: &Path, record: &LedgerRecord) -> Result<(), LedgerError> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", serde_json::to_string(record)?)?;
    file.flush()?;
    Ok(())
}

fn row_to_record(conn: &Connection, id: &str) -> Result<LedgerRecord, LedgerError> {
    conn.query_row(
        "SELECT id, prev_id, kind, task_id, timestamp, inputs_digest, outputs_digest, actor_id, cost_usd
         FROM records WHERE id = ?1",
        params![id],
        row_to_record_fields,
    )
    .map_err(|_| LedgerError::NotFound(id.to_string()))
}

fn row_to_record_fields(row: &rusqlite::Row) -> rusqlite::Result<LedgerRecord> {
    let kind_str: String = row.get(2)?;
    let kind = kind_from_str(&kind_str).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, "bad kind".into())
    })?;
    let timestamp_str: String = row.get(4)?;
    let timestamp = chrono::DateTime::parse_from_rfc3339(&timestamp_str)
        .map_err(|_| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, "bad timestamp".into()))?
        .with_timezone(&Utc);

    Ok(LedgerRecord {
        id: row.get(0)?,
        prev_id: row.get(1)?,
        kind,
        task_id: row.get(3)?,
        timestamp,
        inputs_digest: row.get(5)?,
        outputs_digest: row.get(6)?,
        actor_id: row.get(7)?,
        cost_usd: row.get(8)?,
    })
}
