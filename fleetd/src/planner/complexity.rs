//! Deterministic complexity scoring (§4.1 Analyze phase).
//!
//! `score(task) -> [0,1]` is a pure function of the task's description and
//! structured input — identical inputs produce identical scores.

const MULTISTEP_MARKERS: &[&str] = &["and then", "after that", "next,", "finally,"];

fn has_multistep_connective(description: &str) -> bool {
    let lower = description.to_lowercase();
    if MULTISTEP_MARKERS.iter().any(|m| lower.contains(m)) {
        return true;
    }
    // numbered list items: "1." "2)" etc. on their own line
    description.lines().filter(|line| {
        let trimmed = line.trim_start();
        trimmed.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false)
            && trimmed.chars().find(|c| !c.is_ascii_digit()).map(|c| c == '.' || c == ')').unwrap_or(false)
    }).count() >= 2
}

/// Word count, whitespace-delimited.
fn word_count(description: &str) -> usize {
    description.split_whitespace().count()
}

/// Score in `[0, 1]` combining description length, multi-step connectives,
/// and structured-input size, per the fixed weights:
/// `0.5 * min(1, words/400) + 0.3 * multistep + 0.2 * min(1, bytes/2000)`.
pub fn score(description: &str, structured_inputs: Option<&serde_json::Value>) -> f64 {
    let words = word_count(description) as f64;
    let length_term = 0.5 * (words / 400.0).min(1.0);

    let connective_term = if has_multistep_connective(description) { 0.3 } else { 0.0 };

    let structured_bytes = structured_inputs
        .map(|v| serde_json::to_vec(v).map(|b| b.len()).unwrap_or(0))
        .unwrap_or(0) as f64;
    let structured_term = 0.2 * (structured_bytes / 2000.0).min(1.0);

    (length_term + connective_term + structured_term).clamp(0.0, 1.0)
}
