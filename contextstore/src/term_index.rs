//! Inverted term index with BM25-style ranking (§4.4.1).
//!
//! Tokens are case-folded ASCII words plus bigram splits for any run of CJK
//! codepoints, since whitespace-based tokenization gives those no boundaries.
//! Stop-words are the top-200 most frequent tokens observed so far rather
//! than a fixed language-specific list, matching "language-agnostic" in the
//! spec's own words.

use std::collections::{HashMap, HashSet};

const STOPWORD_CAP: usize = 200;
const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0x3040..=0x30FF | 0xAC00..=0xD7A3)
}

/// Split `text` into lowercase tokens: ASCII word runs as-is, CJK runs as
/// overlapping bigrams.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut ascii_buf = String::new();
    let mut cjk_buf: Vec<char> = Vec::new();

    let flush_ascii = |buf: &mut String, tokens: &mut Vec<String>| {
        if !buf.is_empty() {
            tokens.push(std::mem::take(buf).to_lowercase());
        }
    };
    let flush_cjk = |buf: &mut Vec<char>, tokens: &mut Vec<String>| {
        if buf.len() == 1 {
            tokens.push(buf[0].to_string());
        } else {
            for pair in buf.windows(2) {
                tokens.push(pair.iter().collect());
            }
        }
        buf.clear();
    };

    for c in text.chars() {
        if is_cjk(c) {
            flush_ascii(&mut ascii_buf, &mut tokens);
            cjk_buf.push(c);
        } else if c.is_alphanumeric() {
            flush_cjk(&mut cjk_buf, &mut tokens);
            ascii_buf.push(c);
        } else {
            flush_ascii(&mut ascii_buf, &mut tokens);
            flush_cjk(&mut cjk_buf, &mut tokens);
        }
    }
    flush_ascii(&mut ascii_buf, &mut tokens);
    flush_cjk(&mut cjk_buf, &mut tokens);

    tokens
}

#[derive(Debug, Default)]
struct Posting {
    /// term frequency per document id
    doc_freqs: HashMap<String, u32>,
}

/// Inverted index mapping terms to the documents containing them, with the
/// statistics needed for BM25 scoring.
#[derive(Debug, Default)]
pub struct TermIndex {
    postings: HashMap<String, Posting>,
    doc_lengths: HashMap<String, u32>,
    term_frequency_global: HashMap<String, u32>,
    doc_count: u32,
    total_length: u64,
}

impl TermIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stop-word set: the top `STOPWORD_CAP` most frequent terms.
    fn stopwords(&self) -> HashSet<&str> {
        let mut terms: Vec<(&str, u32)> =
            self.term_frequency_global.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        terms.sort_by(|a, b| b.1.cmp(&a.1));
        terms.into_iter().take(STOPWORD_CAP).map(|(t, _)| t).collect()
    }

    /// Replace (or insert) a document's terms. Idempotent: re-indexing the
    /// same `doc_id` first removes its prior postings.
    pub fn index(&mut self, doc_id: &str, content: &str) {
        self.remove(doc_id);

        let tokens = tokenize(content);
        let len = tokens.len() as u32;

        let mut counts: HashMap<String, u32> = HashMap::new();
        for token in &tokens {
            *counts.entry(token.clone()).or_insert(0) += 1;
            *self.term_frequency_global.entry(token.clone()).or_insert(0) += 1;
        }

        for (term, freq) in counts {
            self.postings.entry(term).or_default().doc_freqs.insert(doc_id.to_string(), freq);
        }

        self.doc_lengths.insert(doc_id.to_string(), len);
        self.doc_count += 1;
        self.total_length += len as u64;
    }

    /// Remove a document's postings entirely (`Unindex`).
    pub fn remove(&mut self, doc_id: &str) {
        if let Some(len) = self.doc_lengths.remove(doc_id) {
            self.doc_count = self.doc_count.saturating_sub(1);
            self.total_length = self.total_length.saturating_sub(len as u64);
        }
        for posting in self.postings.values_mut() {
            posting.doc_freqs.remove(doc_id);
        }
    }

    fn avg_doc_length(&self) -> f64 {
        if self.doc_count == 0 {
            0.0
        } else {
            self.total_length as f64 / self.doc_count as f64
        }
    }

    /// BM25 score of `doc_id` against `query`, 0.0 if no term matches.
    pub fn score(&self, doc_id: &str, query: &str) -> f64 {
        let stopwords = self.stopwords();
        let avg_len = self.avg_doc_length();
        let doc_len = *self.doc_lengths.get(doc_id).unwrap_or(&0) as f64;
        if self.doc_count == 0 {
            return 0.0;
        }

        let mut score = 0.0;
        for term in tokenize(query) {
            if stopwords.contains(term.as_str()) {
                continue;
            }
            let Some(posting) = self.postings.get(&term) else { continue };
            let Some(&tf) = posting.doc_freqs.get(doc_id) else { continue };
            let tf = tf as f64;
            let df = posting.doc_freqs.len() as f64;
            let n = self.doc_count as f64;

            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            let numerator = tf * (BM25_K1 + 1.0);
            let denominator = tf + BM25_K1 * (1.0 - BM25_B + BM25_B * (doc_len / avg_len.max(1.0)));
            score += idf * (numerator / denominator);
        }
        score
    }

    /// All document ids containing at least one non-stopword query term.
    pub fn candidates(&self, query: &str) -> HashSet<String> {
        let stopwords = self.stopwords();
        let mut out = HashSet::new();
        for term in tokenize(query) {
            if stopwords.contains(term.as_str()) {
                continue;
            }
            if let Some(posting) = self.postings.get(&term) {
                out.extend(posting.doc_freqs.keys().cloned());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_cjk_into_bigrams() {
        let tokens = tokenize("hello 世界你好");
        assert!(tokens.contains(&"hello".to_string()));
        assert!(tokens.contains(&"世界".to_string()));
        assert!(tokens.contains(&"界你".to_string()));
    }

    #[test]
    fn reindexing_same_doc_replaces_postings() {
        let mut index = TermIndex::new();
        index.index("a", "apple banana");
        index.index("a", "cherry");
        assert!(index.candidates("apple").is_empty());
        assert!(index.candidates("cherry").contains("a"));
    }

    #[test]
    fn score_favors_more_relevant_document() {
        let mut index = TermIndex::new();
        index.index("a", "rust rust rust systems programming");
        index.index("b", "cooking recipes and gardening tips");

        let score_a = index.score("a", "rust");
        let score_b = index.score("b", "rust");
        assert!(score_a > score_b);
        assert_eq!(score_b, 0.0);
    }

    #[test]
    fn remove_drops_document_from_candidates() {
        let mut index = TermIndex::new();
        index.index("a", "unique-term-xyz");
        assert!(index.candidates("unique-term-xyz").contains("a"));
        index.remove("a");
        assert!(index.candidates("unique-term-xyz").is_empty());
    }
}
