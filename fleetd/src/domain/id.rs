//! Domain ID generation and resolution
//!
//! All IDs use the format: `{6-char-hex}-{type}-{slug}`
//! Example: `019430-task-add-oauth-support`

use std::collections::HashMap;

/// Generate a domain ID from type and title
pub fn generate_id(domain_type: &str, title: &str) -> String {
    let uuid = uuid::Uuid::now_v7();
    let hex_prefix = &uuid.to_string()[..6];
    let slug = slugify(title);
    format!("{hex_prefix}-{domain_type}-{slug}")
}

fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Domain ID wrapper for type-safe ID handling across Task/Subtask/WorkerSlot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainId(String);

impl DomainId {
    pub fn new(domain_type: &str, title: &str) -> Self {
        Self(generate_id(domain_type, title))
    }

    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    pub fn hex_prefix(&self) -> &str {
        &self.0[..6.min(self.0.len())]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn slug(&self) -> Option<&str> {
        let parts: Vec<&str> = self.0.splitn(3, '-').collect();
        parts.get(2).copied()
    }

    pub fn domain_type(&self) -> Option<&str> {
        let parts: Vec<&str> = self.0.splitn(3, '-').collect();
        parts.get(1).copied()
    }
}

impl std::fmt::Display for DomainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DomainId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DomainId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for DomainId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for DomainId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for DomainId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self(s))
    }
}

/// ID resolution for partial matches (hex prefix / slug substring / exact).
pub struct IdResolver<'a> {
    ids: &'a HashMap<String, String>,
}

impl<'a> IdResolver<'a> {
    pub fn new(ids: &'a HashMap<String, String>) -> Self {
        Self { ids }
    }

    /// Resolve a partial reference to a full ID: `Ok(Some(id))` one match,
    /// `Ok(None)` no match, `Err(candidates)` ambiguous.
    pub fn resolve(&self, reference: &str) -> Result<Option<String>, Vec<String>> {
        let matches: Vec<String> = self.ids.keys().filter(|id| Self::matches(id, reference)).cloned().collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches.into_iter().next().unwrap())),
            _ => Err(matches),
        }
    }

    fn matches(id: &str, reference: &str) -> bool {
        if id == reference {
            return true;
        }
        if id.starts_with(reference) {
            return true;
        }
        if let Some(slug_start) = id.find('-') {
            let slug_part = &id[slug_start + 1..];
            if slug_part.contains(reference) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_id_contains_type_and_slug() {
        let id = generate_id("task", "Add OAuth Support");
        assert!(id.contains("-task-"));
        assert!(id.contains("add-oauth-support"));
    }

    #[test]
    fn slugify_strips_apostrophes_and_punctuation() {
        assert_eq!(slugify("don't stop"), "dont-stop");
        assert_eq!(slugify("Multiple   Spaces"), "multiple-spaces");
    }

    #[test]
    fn domain_id_parts_roundtrip() {
        let id = DomainId::from_string("019430-task-add-oauth".to_string());
        assert_eq!(id.hex_prefix(), "019430");
        assert_eq!(id.domain_type(), Some("task"));
        assert_eq!(id.slug(), Some("add-oauth"));
    }

    #[test]
    fn resolver_ambiguous_returns_all_candidates() {
        let mut ids = HashMap::new();
        ids.insert("019430-task-oauth-login".to_string(), "x".to_string());
        ids.insert("019431-task-oauth-logout".to_string(), "y".to_string());

        let resolver = IdResolver::new(&ids);
        let err = resolver.resolve("oauth").unwrap_err();
        assert_eq!(err.len(), 2);
    }
}
