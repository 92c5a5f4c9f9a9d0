//! Pluggable structural parser for `SourceFile` documents (§4.4.2).
//!
//! The core only requires a parser for the repository's own dominant
//! language, with graceful degradation to plain text on failure — it does
//! not mandate a full multi-language AST layer.

use crate::document::StructuralFacts;

/// A lightweight structural parser: yields defined/referenced symbols and
/// imported modules without building a full AST.
pub trait StructuralParser: Send + Sync {
    /// Name of the language this parser targets, for diagnostics.
    fn language(&self) -> &'static str;

    /// Whether this parser claims to handle a file with this extension.
    fn handles(&self, path: &str) -> bool;

    /// Parse `content`, returning the facts it could extract. Implementations
    /// should never panic; a parser that cannot make sense of the content
    /// should return `Ok` with empty facts rather than erroring, so the caller
    /// falls back to plain text rather than losing the document entirely.
    fn parse(&self, content: &str) -> StructuralFacts;
}

/// Parser for Rust source: regex-based symbol extraction, not a real AST.
/// Good enough to populate the structural index without a full `syn` parse.
pub struct RustParser {
    item_re: regex::Regex,
    use_re: regex::Regex,
    call_re: regex::Regex,
}

impl Default for RustParser {
    fn default() -> Self {
        Self {
            item_re: regex::Regex::new(
                r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:fn|struct|enum|trait|const|static)\s+([A-Za-z_][A-Za-z0-9_]*)",
            )
            .expect("static regex"),
            use_re: regex::Regex::new(r"(?m)^\s*use\s+([A-Za-z0-9_:]+)").expect("static regex"),
            call_re: regex::Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("static regex"),
        }
    }
}

impl StructuralParser for RustParser {
    fn language(&self) -> &'static str {
        "rust"
    }

    fn handles(&self, path: &str) -> bool {
        path.ends_with(".rs")
    }

    fn parse(&self, content: &str) -> StructuralFacts {
        let defined_symbols = self
            .item_re
            .captures_iter(content)
            .map(|c| c[1].to_string())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        let imported_modules = self
            .use_re
            .captures_iter(content)
            .map(|c| c[1].to_string())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        let referenced_symbols = self
            .call_re
            .captures_iter(content)
            .map(|c| c[1].to_string())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        StructuralFacts {
            defined_symbols,
            referenced_symbols,
            imported_modules,
        }
    }
}

/// Degrades every file to plain text: no facts extracted. Used whenever no
/// registered parser claims a path, or a claiming parser's `parse` panics-free
/// result is empty.
pub struct PlainTextParser;

impl StructuralParser for PlainTextParser {
    fn language(&self) -> &'static str {
        "text"
    }

    fn handles(&self, _path: &str) -> bool {
        true
    }

    fn parse(&self, _content: &str) -> StructuralFacts {
        StructuralFacts::default()
    }
}

/// Ordered chain of parsers: the first that `handles` a path wins, falling
/// back to `PlainTextParser` if none claim it.
pub struct ParserRegistry {
    parsers: Vec<Box<dyn StructuralParser>>,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self {
            parsers: vec![Box::new(RustParser::default())],
        }
    }
}

impl ParserRegistry {
    pub fn register(&mut self, parser: Box<dyn StructuralParser>) {
        self.parsers.push(parser);
    }

    pub fn parse(&self, path: &str, content: &str) -> StructuralFacts {
        for parser in &self.parsers {
            if parser.handles(path) {
                return parser.parse(content);
            }
        }
        PlainTextParser.parse(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_parser_extracts_fn_and_struct_names() {
        let parser = RustParser::default();
        let facts = parser.parse("pub fn foo() {}\nstruct Bar;\nuse crate::baz;");
        assert!(facts.defined_symbols.contains(&"foo".to_string()));
        assert!(facts.defined_symbols.contains(&"Bar".to_string()));
        assert!(facts.imported_modules.contains(&"crate::baz".to_string()));
    }

    #[test]
    fn registry_falls_back_to_plain_text() {
        let registry = ParserRegistry::default();
        let facts = registry.parse("notes.md", "# hello\nsome *markdown*");
        assert!(facts.defined_symbols.is_empty());
    }

    #[test]
    fn plain_text_parser_never_panics_on_garbage() {
        let parser = PlainTextParser;
        let facts = parser.parse("\u{0}\u{0}not real code {{{{");
        assert!(facts.defined_symbols.is_empty());
    }
}
