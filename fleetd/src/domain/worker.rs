//! Worker Slot and Provider domain types (§3, §4.2).

use std::time::Instant;

/// State of a Worker Slot. Invariant: a slot in `InFlight` owns exactly one
/// Subtask; `InFlight -> Idle` on success, `InFlight -> Cooling` on
/// rate-limit or 5xx, `Cooling -> Idle` once its cooldown expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Reserved,
    InFlight,
    Cooling,
    Disabled,
}

/// A logical handle to a remote LLM endpoint (§3 Worker Slot).
#[derive(Debug, Clone)]
pub struct WorkerSlot {
    pub slot_id: u32,
    pub provider: String,
    pub preferred_model: String,
    pub state: SlotState,
    pub last_completion: Option<Instant>,
    pub cooling_until: Option<Instant>,
    /// exponential moving average of call latency, in milliseconds
    pub rolling_latency_ms: f64,
    /// fraction of the last `recent_outcomes` capacity that succeeded
    recent_outcomes: std::collections::VecDeque<bool>,
}

const ROLLING_WINDOW: usize = 10;
const LATENCY_EMA_ALPHA: f64 = 0.2;

impl WorkerSlot {
    pub fn new(slot_id: u32, provider: impl Into<String>, preferred_model: impl Into<String>) -> Self {
        Self {
            slot_id,
            provider: provider.into(),
            preferred_model: preferred_model.into(),
            state: SlotState::Idle,
            last_completion: None,
            cooling_until: None,
            rolling_latency_ms: 0.0,
            recent_outcomes: std::collections::VecDeque::with_capacity(ROLLING_WINDOW),
        }
    }

    /// Reserve this slot for dispatch: `Idle -> Reserved`. No-op (returns
    /// false) if not currently idle.
    pub fn reserve(&mut self) -> bool {
        if self.state == SlotState::Idle {
            self.state = SlotState::Reserved;
            true
        } else {
            false
        }
    }

    pub fn mark_in_flight(&mut self) {
        self.state = SlotState::InFlight;
    }

    /// Record a successful completion: `InFlight -> Idle`, updates rolling stats.
    pub fn record_success(&mut self, latency_ms: f64) {
        self.state = SlotState::Idle;
        self.last_completion = Some(Instant::now());
        self.rolling_latency_ms = if self.rolling_latency_ms == 0.0 {
            latency_ms
        } else {
            LATENCY_EMA_ALPHA * latency_ms + (1.0 - LATENCY_EMA_ALPHA) * self.rolling_latency_ms
        };
        self.push_outcome(true);
    }

    /// Record a failure: `InFlight -> Cooling` for `cooldown`.
    pub fn record_failure(&mut self, cooldown: std::time::Duration) {
        self.state = SlotState::Cooling;
        self.cooling_until = Some(Instant::now() + cooldown);
        self.push_outcome(false);
    }

    /// `Cooling -> Idle` once the cooldown has elapsed. No-op otherwise.
    pub fn tick_cooldown(&mut self) {
        if self.state == SlotState::Cooling {
            if let Some(until) = self.cooling_until {
                if Instant::now() >= until {
                    self.state = SlotState::Idle;
                    self.cooling_until = None;
                }
            }
        }
    }

    fn push_outcome(&mut self, success: bool) {
        if self.recent_outcomes.len() == ROLLING_WINDOW {
            self.recent_outcomes.pop_front();
        }
        self.recent_outcomes.push_back(success);
    }

    /// Success rate over the most recent (up to 10) calls. 1.0 if no history.
    pub fn success_rate(&self) -> f64 {
        if self.recent_outcomes.is_empty() {
            return 1.0;
        }
        let successes = self.recent_outcomes.iter().filter(|s| **s).count();
        successes as f64 / self.recent_outcomes.len() as f64
    }
}

/// A configured upstream endpoint (§3 Provider), created at start-up and
/// living the process lifetime.
#[derive(Debug, Clone)]
pub struct Provider {
    pub name: String,
    pub base_url: String,
    pub credential: String,
    pub models: Vec<String>,
    pub concurrency_cap: u32,
    pub token_budget_per_minute: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn reserve_fails_when_not_idle() {
        let mut slot = WorkerSlot::new(1, "openai", "gpt-test");
        assert!(slot.reserve());
        assert!(!slot.reserve());
    }

    #[test]
    fn success_then_failure_updates_success_rate() {
        let mut slot = WorkerSlot::new(1, "openai", "gpt-test");
        slot.record_success(100.0);
        slot.record_success(120.0);
        assert_eq!(slot.success_rate(), 1.0);

        slot.mark_in_flight();
        slot.record_failure(Duration::from_millis(1));
        assert!((slot.success_rate() - (2.0 / 3.0)).abs() < 1e-9);
        assert_eq!(slot.state, SlotState::Cooling);
    }

    #[test]
    fn cooldown_expires_back_to_idle() {
        let mut slot = WorkerSlot::new(1, "openai", "gpt-test");
        slot.mark_in_flight();
        slot.record_failure(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        slot.tick_cooldown();
        assert_eq!(slot.state, SlotState::Idle);
    }

    #[test]
    fn rolling_window_caps_at_ten_outcomes() {
        let mut slot = WorkerSlot::new(1, "openai", "gpt-test");
        for _ in 0..5 {
            slot.record_success(100.0);
        }
        for _ in 0..10 {
            slot.mark_in_flight();
            slot.record_failure(Duration::from_millis(1));
        }
        // only the most recent 10 outcomes (all failures) should count
        assert_eq!(slot.success_rate(), 0.0);
    }
}
