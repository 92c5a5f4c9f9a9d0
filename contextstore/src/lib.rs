//! Unified search index over source files, project memory, and change
//! records, plus the 3-file project memory (FULL/CRITERIA/CHANGELOG) that
//! sits on top of it.
//!
//! Grown from an RLM-style flat chunk store into a document store composed
//! of three secondary indexes (inverted term index, structural parser,
//! metadata facets) plus a dependency graph — context retrieval is always
//! through `SearchIndex`/`ProjectMemory`, never a full-file read.

pub mod config;
pub mod document;
pub mod error;
pub mod graph;
pub mod memory;
pub mod store;
pub mod structural;
pub mod term_index;

pub use config::Config;
pub use document::{DocumentKind, Facets, Fingerprint, IndexDocument, StructuralFacts};
pub use error::IndexError;
pub use graph::{DependencyGraph, Direction};
pub use memory::{ChangeCategory, MemoryKind, ProjectMemory};
pub use store::{Filters, SearchHit, SearchIndex, SourceKind};
pub use structural::{ParserRegistry, PlainTextParser, RustParser, StructuralParser};
