//! Project Memory: the FULL/CRITERIA/CHANGELOG triple (§4.5).
//!
//! Files live on disk as Markdown with a front-matter block, matching
//! `#6`'s persisted-state layout (`memory/<project>/FULL.md` etc.), and are
//! mirrored into the `SearchIndex` so `RelevantContext` can be served by
//! `Search` rather than a full-file read.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::document::{DocumentKind, Facets};
use crate::error::IndexError;
use crate::store::{Filters, SearchIndex, SourceKind};

/// Which of the two replaceable memory files an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    Full,
    Criteria,
}

impl MemoryKind {
    fn file_name(self) -> &'static str {
        match self {
            MemoryKind::Full => "FULL.md",
            MemoryKind::Criteria => "CRITERIA.md",
        }
    }

    fn document_kind(self) -> DocumentKind {
        match self {
            MemoryKind::Full => DocumentKind::MemoryFull,
            MemoryKind::Criteria => DocumentKind::MemoryCriteria,
        }
    }
}

/// Closed set of change categories (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeCategory {
    Added,
    Changed,
    Fixed,
    Removed,
    Note,
}

impl std::fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChangeCategory::Added => "Added",
            ChangeCategory::Changed => "Changed",
            ChangeCategory::Fixed => "Fixed",
            ChangeCategory::Removed => "Removed",
            ChangeCategory::Note => "Note",
        };
        write!(f, "{s}")
    }
}

impl ChangeCategory {
    /// Classify a free-form entry by its first matching verb; `Note` otherwise.
    pub fn classify(entry: &str) -> Self {
        let lower = entry.to_lowercase();
        if lower.starts_with("add") || lower.contains(" add ") {
            ChangeCategory::Added
        } else if lower.starts_with("fix") || lower.contains(" fix ") {
            ChangeCategory::Fixed
        } else if lower.starts_with("remove") || lower.starts_with("delete") {
            ChangeCategory::Removed
        } else if lower.starts_with("change") || lower.starts_with("update") {
            ChangeCategory::Changed
        } else {
            ChangeCategory::Note
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FrontMatter {
    project: String,
    version_tag: String,
}

fn render(front: &FrontMatter, sections: &[(String, String)]) -> String {
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&serde_yaml::to_string(front).unwrap_or_default());
    out.push_str("---\n\n");
    for (heading, body) in sections {
        out.push_str(&format!("## {heading}\n\n{body}\n\n"));
    }
    out
}

fn parse_sections(content: &str) -> Vec<(String, String)> {
    let body = content.splitn(3, "---\n").nth(2).unwrap_or(content);
    let mut sections = Vec::new();
    let mut current_heading: Option<String> = None;
    let mut current_body = String::new();

    for line in body.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            if let Some(prev) = current_heading.take() {
                sections.push((prev, current_body.trim().to_string()));
                current_body.clear();
            }
            current_heading = Some(heading.trim().to_string());
        } else {
            current_body.push_str(line);
            current_body.push('\n');
        }
    }
    if let Some(prev) = current_heading {
        sections.push((prev, current_body.trim().to_string()));
    }
    sections
}

/// A project's durable memory triple, backed by Markdown files and mirrored
/// into a `SearchIndex`.
pub struct ProjectMemory<'a> {
    data_dir: PathBuf,
    index: &'a SearchIndex,
    /// Serialises writes to a single project's FULL document (§5 ordering
    /// guarantee: concurrent writes to the same project's FULL are linearised).
    write_lock: Mutex<()>,
}

impl<'a> ProjectMemory<'a> {
    pub fn new(data_dir: impl AsRef<Path>, index: &'a SearchIndex) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            index,
            write_lock: Mutex::new(()),
        }
    }

    fn project_dir(&self, project: &str) -> PathBuf {
        self.data_dir.join(project)
    }

    fn doc_id(project: &str, kind: DocumentKind) -> String {
        format!("{project}/{kind}")
    }

    /// Create the triple with empty-but-well-formed content.
    pub fn initialize_project(&self, project: &str) -> Result<(), IndexError> {
        let _guard = self.write_lock.lock().unwrap();
        let dir = self.project_dir(project);

        if dir.exists() {
            return Err(IndexError::AlreadyExists(project.to_string()));
        }
        fs::create_dir_all(&dir)?;

        let front = FrontMatter {
            project: project.to_string(),
            version_tag: "0.1.0".to_string(),
        };

        for kind in [MemoryKind::Full, MemoryKind::Criteria] {
            let content = render(&front, &[]);
            fs::write(dir.join(kind.file_name()), &content)?;
            self.index.index(
                &Self::doc_id(project, kind.document_kind()),
                kind.document_kind(),
                &content,
                Facets { project: project.to_string(), ..Default::default() },
                kind.file_name(),
                Utc::now(),
            )?;
        }

        fs::write(dir.join("CHANGELOG.md"), "")?;
        self.index.index(
            &Self::doc_id(project, DocumentKind::MemoryChangelog),
            DocumentKind::MemoryChangelog,
            "",
            Facets { project: project.to_string(), ..Default::default() },
            "CHANGELOG.md",
            Utc::now(),
        )?;

        info!(project, "project memory initialized");
        Ok(())
    }

    /// Read one named section's text, without returning the whole file.
    pub fn read_section(&self, project: &str, kind: MemoryKind, section: &str) -> Result<String, IndexError> {
        let path = self.project_dir(project).join(kind.file_name());
        let content = fs::read_to_string(&path)
            .map_err(|_| IndexError::NotFound(format!("{project}/{}", kind.file_name())))?;

        parse_sections(&content)
            .into_iter()
            .find(|(heading, _)| heading == section)
            .map(|(_, body)| body)
            .ok_or_else(|| IndexError::NotFound(format!("{project}/{}#{section}", kind.file_name())))
    }

    /// Append one chronologically-ordered entry to CHANGELOG. Never rewrites
    /// earlier content.
    pub fn append_change(&self, project: &str, entry: &str) -> Result<(), IndexError> {
        let _guard = self.write_lock.lock().unwrap();
        self.append_change_locked(project, entry)
    }

    /// `append_change` body, assuming `write_lock` is already held by the
    /// caller. Lets `replace_section` hold one guard across both its FULL
    /// write and the CHANGELOG append so the two can't interleave with a
    /// concurrent `replace_section`/`append_change` call on the same project.
    fn append_change_locked(&self, project: &str, entry: &str) -> Result<(), IndexError> {
        let category = ChangeCategory::classify(entry);
        let path = self.project_dir(project).join("CHANGELOG.md");

        let now = Utc::now();
        let heading = format!("## {}\n\n- **{category}**: {entry}\n\n", now.to_rfc3339());

        let mut file = fs::OpenOptions::new().append(true).create(true).open(&path)?;
        use std::io::Write;
        write!(file, "{heading}")?;

        let full_content = fs::read_to_string(&path)?;
        self.index.index(
            &Self::doc_id(project, DocumentKind::MemoryChangelog),
            DocumentKind::MemoryChangelog,
            &full_content,
            Facets {
                project: project.to_string(),
                change_kind: Some(category.to_string()),
                ..Default::default()
            },
            "CHANGELOG.md",
            now,
        )?;

        Ok(())
    }

    /// Atomically replace a named section of FULL or CRITERIA, then append a
    /// categorized CHANGELOG summary (§4.5 invariant: MUST also `AppendChange`).
    pub fn replace_section(
        &self,
        project: &str,
        kind: MemoryKind,
        section: &str,
        text: &str,
        change_summary: &str,
    ) -> Result<(), IndexError> {
        let _guard = self.write_lock.lock().unwrap();
        let path = self.project_dir(project).join(kind.file_name());
        let content = fs::read_to_string(&path)
            .map_err(|_| IndexError::NotFound(format!("{project}/{}", kind.file_name())))?;

        let mut sections = parse_sections(&content);
        match sections.iter_mut().find(|(heading, _)| heading == section) {
            Some((_, body)) => *body = text.to_string(),
            None => sections.push((section.to_string(), text.to_string())),
        }

        let front = FrontMatter {
            project: project.to_string(),
            version_tag: "0.1.0".to_string(),
        };
        let rendered = render(&front, &sections);
        fs::write(&path, &rendered)?;

        self.index.index(
            &Self::doc_id(project, kind.document_kind()),
            kind.document_kind(),
            &rendered,
            Facets { project: project.to_string(), ..Default::default() },
            kind.file_name(),
            Utc::now(),
        )?;

        self.append_change_locked(project, change_summary)
    }

    /// Token-bounded context relevant to `query`, drawn from the three files
    /// via the search index (never a full-file read).
    pub fn relevant_context(&self, project: &str, query: &str, budget_tokens: usize) -> String {
        let mut sources = HashSet::new();
        sources.insert(SourceKind::Memory);
        let filters = Filters { project: Some(project.to_string()), ..Default::default() };

        let hits = self.index.search(query, &sources, &filters, 16);
        let mut out = String::new();
        let mut used = 0usize;

        for hit in hits {
            // rough token estimate: whitespace-split word count
            let words = hit.snippet.split_whitespace().count();
            if used + words > budget_tokens {
                break;
            }
            out.push_str(&hit.snippet);
            out.push_str("\n\n");
            used += words;
        }
        out
    }
}
