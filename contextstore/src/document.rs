//! Index document types: the unit the three secondary indexes all key off.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of indexed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DocumentKind {
    SourceFile,
    MemoryFull,
    MemoryCriteria,
    MemoryChangelog,
    ChangeRecord,
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DocumentKind::SourceFile => "SourceFile",
            DocumentKind::MemoryFull => "MemoryFull",
            DocumentKind::MemoryCriteria => "MemoryCriteria",
            DocumentKind::MemoryChangelog => "MemoryChangelog",
            DocumentKind::ChangeRecord => "ChangeRecord",
        };
        write!(f, "{s}")
    }
}

/// Content fingerprint: a hash of the document's raw content, used for
/// idempotent re-indexing (§3 Index Document invariant).
pub type Fingerprint = String;

/// Facts extracted by the structural parser for a `SourceFile`, or left
/// empty for non-source documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuralFacts {
    pub defined_symbols: Vec<String>,
    pub referenced_symbols: Vec<String>,
    pub imported_modules: Vec<String>,
}

/// Facet values attached to a document for filterable metadata queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Facets {
    pub project: String,
    pub version_tag: Option<String>,
    pub change_kind: Option<String>,
    pub breaking: bool,
}

/// A single document in the store, carrying its content plus everything
/// derived from it by the three secondary indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: String,
    pub kind: DocumentKind,
    pub content: String,
    pub fingerprint: Fingerprint,
    pub facts: StructuralFacts,
    pub facets: Facets,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl IndexDocument {
    /// Build a document, computing its fingerprint from `content`.
    pub fn new(
        id: impl Into<String>,
        kind: DocumentKind,
        content: impl Into<String>,
        facets: Facets,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let content = content.into();
        let fingerprint = fingerprint_of(content.as_bytes());
        Self {
            id: id.into(),
            kind,
            content,
            fingerprint,
            facts: StructuralFacts::default(),
            facets,
            timestamp,
        }
    }
}

/// Hash content into a stable fingerprint (`Index`/`Unindex` idempotence, §4.4).
pub fn fingerprint_of(content: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
