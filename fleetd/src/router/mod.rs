//! Router: picks a strategy tag and a (provider, model) candidate for each
//! subtask (§4.3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::WorkerSlot;

/// Closed set of routing strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Shortest description, deterministic format tasks. Smallest/cheapest
    /// model. Timeout 10s.
    Fast,
    /// Default strategy for coding subtasks. Timeout 60s.
    Standard,
    /// Complexity > 0.7, multi-step reasoning. Timeout 180s. Eligible for a
    /// provider's "thinking" model if exposed.
    Deep,
    /// Aggregation subtasks: input is the concatenation of child outputs.
    Aggregate,
}

impl Strategy {
    pub fn timeout(&self) -> std::time::Duration {
        match self {
            Strategy::Fast => std::time::Duration::from_secs(10),
            Strategy::Standard => std::time::Duration::from_secs(60),
            Strategy::Deep => std::time::Duration::from_secs(180),
            Strategy::Aggregate => std::time::Duration::from_secs(60),
        }
    }

    /// Choose a strategy from a subtask's complexity score (§4.1/§4.3).
    pub fn from_complexity(complexity: f64, is_aggregation: bool) -> Self {
        if is_aggregation {
            return Strategy::Aggregate;
        }
        if complexity > 0.7 {
            Strategy::Deep
        } else if complexity < 0.25 {
            Strategy::Fast
        } else {
            Strategy::Standard
        }
    }
}

/// A (provider, model) pair declared eligible for a strategy, in priority
/// order (highest priority first).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider: String,
    pub model: String,
}

/// Outcome of a routing decision. `Degraded` means no candidate met the
/// health thresholds and the least-loaded one was picked anyway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    Selected { provider: String, model: String },
    Degraded { provider: String, model: String },
}

impl RoutingDecision {
    pub fn provider(&self) -> &str {
        match self {
            RoutingDecision::Selected { provider, .. } | RoutingDecision::Degraded { provider, .. } => provider,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            RoutingDecision::Selected { model, .. } | RoutingDecision::Degraded { model, .. } => model,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, RoutingDecision::Degraded { .. })
    }
}

/// Health snapshot the Router consults when scoring candidates. One entry
/// per provider, aggregated across that provider's Worker Slots.
#[derive(Debug, Clone, Copy)]
pub struct ProviderHealth {
    pub in_flight: u32,
    pub concurrency_cap: u32,
    pub success_rate: f64,
    pub rolling_latency_ms: f64,
}

impl ProviderHealth {
    fn load_ratio(&self) -> f64 {
        if self.concurrency_cap == 0 {
            return 1.0;
        }
        self.in_flight as f64 / self.concurrency_cap as f64
    }

    fn qualifies(&self) -> bool {
        self.load_ratio() < 0.8 && self.success_rate >= 0.5
    }
}

/// Aggregates Worker Slot rolling stats into one `ProviderHealth` per
/// provider name, for use by [`Router::select`].
pub fn aggregate_health(slots: &[WorkerSlot], concurrency_caps: &HashMap<String, u32>) -> HashMap<String, ProviderHealth> {
    let mut in_flight: HashMap<String, u32> = HashMap::new();
    let mut latency_sum: HashMap<String, f64> = HashMap::new();
    let mut success_sum: HashMap<String, f64> = HashMap::new();
    let mut count: HashMap<String, u32> = HashMap::new();

    for slot in slots {
        if slot.state == crate::domain::SlotState::InFlight {
            *in_flight.entry(slot.provider.clone()).or_default() += 1;
        }
        *latency_sum.entry(slot.provider.clone()).or_default() += slot.rolling_latency_ms;
        *success_sum.entry(slot.provider.clone()).or_default() += slot.success_rate();
        *count.entry(slot.provider.clone()).or_default() += 1;
    }

    count
        .into_iter()
        .map(|(provider, n)| {
            let n = n.max(1) as f64;
            let health = ProviderHealth {
                in_flight: *in_flight.get(&provider).unwrap_or(&0),
                concurrency_cap: *concurrency_caps.get(&provider).unwrap_or(&1),
                success_rate: success_sum.get(&provider).copied().unwrap_or(1.0) / n,
                rolling_latency_ms: latency_sum.get(&provider).copied().unwrap_or(0.0) / n,
            };
            (provider, health)
        })
        .collect()
}

/// Approximate context-window budget, in characters, for an Aggregate
/// subtask's chosen model. Mirrors the pricing-tier heuristic
/// `TokenUsage::cost_usd` uses for the same model names.
pub fn aggregate_context_budget_chars(model: &str) -> usize {
    match model {
        m if m.contains("large") || m.contains("opus") || m.contains("70b") => 400_000,
        m if m.contains("mini") || m.contains("haiku") || m.contains("8b") => 60_000,
        _ => 120_000,
    }
}

/// Whether an Aggregate subtask's concatenated child input fits `model`'s
/// context as-is, or whether the Router must insert an intermediate
/// compression subtask first (§4.3).
pub fn fits_aggregate_context(content: &str, model: &str) -> bool {
    content.len() <= aggregate_context_budget_chars(model)
}

/// Per-strategy ordered candidate lists, declared at start-up (§4.3).
pub struct Router {
    candidates: HashMap<Strategy, Vec<Candidate>>,
}

impl Router {
    pub fn new(candidates: HashMap<Strategy, Vec<Candidate>>) -> Self {
        Self { candidates }
    }

    /// Select a (provider, model) for `strategy` given the current provider
    /// health snapshot. Ties broken by lowest rolling latency, then by the
    /// declared candidate order (§4.3 tie-breaks).
    pub fn select(&self, strategy: Strategy, health: &HashMap<String, ProviderHealth>) -> Option<RoutingDecision> {
        let candidates = self.candidates.get(&strategy)?;
        if candidates.is_empty() {
            return None;
        }

        if let Some(candidate) = candidates.iter().find(|c| health.get(&c.provider).map(|h| h.qualifies()).unwrap_or(false)) {
            return Some(RoutingDecision::Selected { provider: candidate.provider.clone(), model: candidate.model.clone() });
        }

        let least_loaded = candidates.iter().min_by(|a, b| {
            let load_a = health.get(&a.provider).map(|h| h.load_ratio()).unwrap_or(0.0);
            let load_b = health.get(&b.provider).map(|h| h.load_ratio()).unwrap_or(0.0);
            let latency_a = health.get(&a.provider).map(|h| h.rolling_latency_ms).unwrap_or(0.0);
            let latency_b = health.get(&b.provider).map(|h| h.rolling_latency_ms).unwrap_or(0.0);
            load_a
                .partial_cmp(&load_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(latency_a.partial_cmp(&latency_b).unwrap_or(std::cmp::Ordering::Equal))
        })?;

        Some(RoutingDecision::Degraded { provider: least_loaded.provider.clone(), model: least_loaded.model.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy(in_flight: u32, cap: u32, success_rate: f64) -> ProviderHealth {
        ProviderHealth { in_flight, concurrency_cap: cap, success_rate, rolling_latency_ms: 100.0 }
    }

    fn router_with(candidates: Vec<Candidate>) -> Router {
        let mut map = HashMap::new();
        map.insert(Strategy::Standard, candidates);
        Router::new(map)
    }

    #[test]
    fn picks_first_qualifying_candidate_in_priority_order() {
        let router = router_with(vec![
            Candidate { provider: "a".into(), model: "m1".into() },
            Candidate { provider: "b".into(), model: "m2".into() },
        ]);
        let mut health = HashMap::new();
        health.insert("a".to_string(), healthy(9, 10, 0.9)); // load 0.9 >= 0.8, disqualified
        health.insert("b".to_string(), healthy(1, 10, 0.9));

        let decision = router.select(Strategy::Standard, &health).unwrap();
        assert_eq!(decision, RoutingDecision::Selected { provider: "b".into(), model: "m2".into() });
        assert!(!decision.is_degraded());
    }

    #[test]
    fn falls_back_to_degraded_least_loaded_when_none_qualify() {
        let router = router_with(vec![
            Candidate { provider: "a".into(), model: "m1".into() },
            Candidate { provider: "b".into(), model: "m2".into() },
        ]);
        let mut health = HashMap::new();
        health.insert("a".to_string(), healthy(9, 10, 0.9));
        health.insert("b".to_string(), healthy(8, 10, 0.9));

        let decision = router.select(Strategy::Standard, &health).unwrap();
        assert!(decision.is_degraded());
        assert_eq!(decision.provider(), "b");
    }

    #[test]
    fn strategy_from_complexity_thresholds() {
        assert_eq!(Strategy::from_complexity(0.1, false), Strategy::Fast);
        assert_eq!(Strategy::from_complexity(0.5, false), Strategy::Standard);
        assert_eq!(Strategy::from_complexity(0.9, false), Strategy::Deep);
        assert_eq!(Strategy::from_complexity(0.9, true), Strategy::Aggregate);
    }

    #[test]
    fn unknown_strategy_returns_none() {
        let router = router_with(vec![]);
        assert!(router.select(Strategy::Fast, &HashMap::new()).is_none());
    }

    #[test]
    fn small_model_has_a_smaller_aggregate_context_budget() {
        assert!(aggregate_context_budget_chars("gpt-4o-mini") < aggregate_context_budget_chars("gpt-4o"));
    }

    #[test]
    fn fits_aggregate_context_respects_the_model_budget() {
        let content = "x".repeat(100_000);
        assert!(!fits_aggregate_context(&content, "gpt-4o-mini"));
        assert!(fits_aggregate_context(&content, "claude-opus"));
    }
}
