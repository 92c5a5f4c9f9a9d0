//! The unified search index: document store + term index + structural facts
//! + metadata facets + dependency graph, composed behind one set of
//! operations (§4.4).
//!
//! Persistence follows the append-only JSONL idiom used elsewhere in this
//! workspace (`ledgerstore`'s chain log, the teacher's `EventStore`): every
//! `Index`/`Unindex` call appends one line; on open, the log is replayed to
//! rebuild in-memory state, so the index survives a process restart without
//! re-indexing from scratch.

use std::collections::HashSet;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::document::{DocumentKind, Facets, Fingerprint, IndexDocument};
use crate::error::IndexError;
use crate::graph::{DependencyGraph, Direction};
use crate::structural::ParserRegistry;
use crate::term_index::TermIndex;

/// Source subset a `Search` call may restrict itself to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Files,
    Memory,
    Changes,
}

impl SourceKind {
    fn matches(self, kind: DocumentKind) -> bool {
        matches!(
            (self, kind),
            (SourceKind::Files, DocumentKind::SourceFile)
                | (SourceKind::Memory, DocumentKind::MemoryFull)
                | (SourceKind::Memory, DocumentKind::MemoryCriteria)
                | (SourceKind::Memory, DocumentKind::MemoryChangelog)
                | (SourceKind::Changes, DocumentKind::ChangeRecord)
        )
    }
}

/// Facet filters applicable to a `Search` call (§4.4).
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub modified_after: Option<DateTime<Utc>>,
    pub modified_before: Option<DateTime<Utc>>,
    pub project: Option<String>,
    pub breaking_flag: Option<bool>,
    pub change_kind: Option<String>,
    pub symbol_name: Option<String>,
    pub import_of: Option<String>,
}

impl Filters {
    fn passes(&self, doc: &IndexDocument) -> bool {
        if let Some(after) = self.modified_after {
            if doc.timestamp < after {
                return false;
            }
        }
        if let Some(before) = self.modified_before {
            if doc.timestamp > before {
                return false;
            }
        }
        if let Some(project) = &self.project {
            if &doc.facets.project != project {
                return false;
            }
        }
        if let Some(breaking) = self.breaking_flag {
            if doc.facets.breaking != breaking {
                return false;
            }
        }
        if let Some(kind) = &self.change_kind {
            if doc.facets.change_kind.as_deref() != Some(kind.as_str()) {
                return false;
            }
        }
        if let Some(symbol) = &self.symbol_name {
            if !doc.facts.defined_symbols.iter().any(|s| s == symbol) {
                return false;
            }
        }
        if let Some(module) = &self.import_of {
            if !doc.facts.imported_modules.iter().any(|m| m == module) {
                return false;
            }
        }
        true
    }
}

/// One ranked search result.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub id: String,
    pub kind: DocumentKind,
    pub score: f64,
    pub snippet: String,
}

const RECENCY_HALF_LIFE_DAYS: f64 = 30.0;

fn source_priority(kind: DocumentKind) -> f64 {
    match kind {
        DocumentKind::MemoryFull | DocumentKind::MemoryCriteria | DocumentKind::MemoryChangelog => 1.2,
        DocumentKind::SourceFile => 1.0,
        DocumentKind::ChangeRecord => 0.8,
    }
}

fn recency_boost(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - timestamp).num_seconds().max(0) as f64 / 86_400.0;
    0.5f64.powf(age_days / RECENCY_HALF_LIFE_DAYS)
}

fn snippet_of(content: &str, query: &str) -> String {
    let lower = content.to_lowercase();
    let needle = query.to_lowercase();
    let first_term = needle.split_whitespace().next().unwrap_or("");
    let pos = lower.find(first_term).unwrap_or(0);
    let start = pos.saturating_sub(40);
    let end = (pos + first_term.len() + 80).min(content.len());
    content.get(start..end).unwrap_or(content).to_string()
}

struct State {
    documents: std::collections::HashMap<String, IndexDocument>,
    term_index: TermIndex,
    graph: DependencyGraph,
}

/// Process-wide search index singleton, guarded by its own `RwLock` per the
/// "no cross-singleton lock held during a remote call" shared-resource policy.
pub struct SearchIndex {
    state: RwLock<State>,
    log_path: PathBuf,
    parsers: ParserRegistry,
}

#[derive(serde::Serialize, serde::Deserialize)]
enum LogEntry {
    Upsert(IndexDocument),
    Tombstone(String),
}

impl SearchIndex {
    /// Open (or create) an index rooted at `data_dir`, replaying its log.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, IndexError> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        let log_path = data_dir.join("index.jsonl");

        let mut state = State {
            documents: std::collections::HashMap::new(),
            term_index: TermIndex::new(),
            graph: DependencyGraph::new(),
        };

        if log_path.exists() {
            let file = fs::File::open(&log_path)?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LogEntry>(&line)? {
                    LogEntry::Upsert(doc) => {
                        state.term_index.index(&doc.id, &doc.content);
                        state.graph.set_edges(&doc.id, doc.facts.referenced_symbols.clone());
                        state.documents.insert(doc.id.clone(), doc);
                    }
                    LogEntry::Tombstone(id) => {
                        state.term_index.remove(&id);
                        state.graph.remove_node(&id);
                        state.documents.remove(&id);
                    }
                }
            }
        }

        info!(?data_dir, documents = state.documents.len(), "search index opened");

        Ok(Self {
            state: RwLock::new(state),
            log_path,
            parsers: ParserRegistry::default(),
        })
    }

    fn append_log(&self, entry: &LogEntry) -> Result<(), IndexError> {
        let mut file = fs::OpenOptions::new().create(true).append(true).open(&self.log_path)?;
        writeln!(file, "{}", serde_json::to_string(entry)?)?;
        file.flush()?;
        Ok(())
    }

    /// Index (or re-index) a document. Idempotent by (id, fingerprint): if an
    /// existing document has the same id and fingerprint, this is a no-op.
    pub fn index(
        &self,
        id: &str,
        kind: DocumentKind,
        content: &str,
        facets: Facets,
        path_hint: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Fingerprint, IndexError> {
        let mut state = self.state.write().unwrap();

        if let Some(existing) = state.documents.get(id) {
            let candidate_fp = crate::document::fingerprint_of(content.as_bytes());
            if existing.fingerprint == candidate_fp {
                debug!(id, "index: fingerprint unchanged, no-op");
                return Ok(candidate_fp);
            }
        }

        let mut doc = IndexDocument::new(id, kind, content, facets, timestamp);
        if kind == DocumentKind::SourceFile {
            doc.facts = self.parsers.parse(path_hint, &doc.content);
        }

        state.term_index.index(id, &doc.content);
        state.graph.set_edges(id, doc.facts.referenced_symbols.clone());
        let fingerprint = doc.fingerprint.clone();
        state.documents.insert(id.to_string(), doc.clone());

        drop(state);
        self.append_log(&LogEntry::Upsert(doc))?;
        debug!(id, %fingerprint, "document indexed");
        Ok(fingerprint)
    }

    /// Remove a document and its outgoing edges.
    pub fn unindex(&self, id: &str) -> Result<(), IndexError> {
        let mut state = self.state.write().unwrap();
        if !state.documents.contains_key(id) {
            return Err(IndexError::NotFound(id.to_string()));
        }
        state.term_index.remove(id);
        state.graph.remove_node(id);
        state.documents.remove(id);
        drop(state);
        self.append_log(&LogEntry::Tombstone(id.to_string()))?;
        info!(id, "document unindexed");
        Ok(())
    }

    /// Current fingerprint of a document, or `NotFound`.
    pub fn fingerprint(&self, id: &str) -> Result<Fingerprint, IndexError> {
        let state = self.state.read().unwrap();
        state
            .documents
            .get(id)
            .map(|d| d.fingerprint.clone())
            .ok_or_else(|| IndexError::NotFound(id.to_string()))
    }

    /// Rank and return hits for `query`, restricted to `sources` and `filters`.
    pub fn search(
        &self,
        query: &str,
        sources: &HashSet<SourceKind>,
        filters: &Filters,
        limit: usize,
    ) -> Vec<SearchHit> {
        let state = self.state.read().unwrap();
        let now = Utc::now();

        let candidates = state.term_index.candidates(query);
        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter_map(|id| {
                let doc = state.documents.get(&id)?;
                if !sources.is_empty() && !sources.iter().any(|s| s.matches(doc.kind)) {
                    return None;
                }
                if !filters.passes(doc) {
                    return None;
                }
                let term_score = state.term_index.score(&id, query);
                let score = term_score * source_priority(doc.kind) * recency_boost(doc.timestamp, now);
                Some(SearchHit {
                    id: id.clone(),
                    kind: doc.kind,
                    score,
                    snippet: snippet_of(&doc.content, query),
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        hits
    }

    /// Walk the dependency graph from `id`.
    pub fn neighbors(&self, id: &str, direction: Direction, depth: usize) -> Vec<String> {
        let state = self.state.read().unwrap();
        state.graph.neighbors(id, direction, depth)
    }

    /// Fetch a document's full record (used by `Memory::read_section` and tests).
    pub fn get(&self, id: &str) -> Result<IndexDocument, IndexError> {
        let state = self.state.read().unwrap();
        state.documents.get(id).cloned().ok_or_else(|| IndexError::NotFound(id.to_string()))
    }
}
