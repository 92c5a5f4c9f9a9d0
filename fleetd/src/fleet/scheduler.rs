//! Slot scheduler: a priority queue of subtasks waiting for a Worker Slot on
//! a given provider, with `Notify`-based wake-up on slot release.
//!
//! Grounded on the source repo's `Scheduler` (`src/scheduler/core.rs`,
//! `src/scheduler/queue.rs`): same `BinaryHeap` + `Mutex` + `Notify` shape,
//! generalized from "wait for loop concurrency" to "wait for a Worker Slot
//! bound to a specific provider."

use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::domain::{SlotState, WorkerSlot};

/// A subtask waiting for a slot on one provider.
#[derive(Debug, Clone)]
struct WaitEntry {
    subtask_id: String,
    submitted_at: Instant,
}

impl Eq for WaitEntry {}

impl PartialEq for WaitEntry {
    fn eq(&self, other: &Self) -> bool {
        self.subtask_id == other.subtask_id
    }
}

impl Ord for WaitEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Earlier submission first: reverse `Instant` ordering so the
        // `BinaryHeap` (a max-heap) pops the oldest entry first.
        other.submitted_at.cmp(&self.submitted_at)
    }
}

impl PartialOrd for WaitEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    slots: Vec<WorkerSlot>,
    waiters: HashMap<String, BinaryHeap<WaitEntry>>,
}

/// Result of a reservation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveResult {
    Reserved(u32),
    Queued,
}

/// Owns the Worker Slot pool and arbitrates access to Idle slots per
/// provider. One instance shared process-wide.
pub struct SlotScheduler {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl SlotScheduler {
    pub fn new(slots: Vec<WorkerSlot>) -> Self {
        Self { inner: Mutex::new(Inner { slots, waiters: HashMap::new() }), notify: Notify::new() }
    }

    /// Try to reserve an Idle slot for `provider` immediately; otherwise
    /// queue `subtask_id` and return `Queued`.
    ///
    /// When an Idle slot exists but other callers are already queued ahead
    /// of `subtask_id`, the slot goes to whichever waiter was queued first
    /// (`waiters` FIFO order), not to whichever caller happens to re-poll
    /// first after a broadcast wake-up.
    pub async fn try_reserve(&self, provider: &str, subtask_id: &str) -> ReserveResult {
        let mut inner = self.inner.lock().await;
        let has_idle = inner.slots.iter().any(|s| s.provider == provider && s.state == SlotState::Idle);

        if has_idle {
            let front_is_caller_or_empty = inner
                .waiters
                .get(provider)
                .and_then(|heap| heap.peek())
                .map(|front| front.subtask_id == subtask_id)
                .unwrap_or(true);

            if front_is_caller_or_empty {
                if let Some(heap) = inner.waiters.get_mut(provider) {
                    heap.pop();
                }
                let slot = inner
                    .slots
                    .iter_mut()
                    .find(|s| s.provider == provider && s.state == SlotState::Idle)
                    .expect("has_idle checked above");
                slot.reserve();
                return ReserveResult::Reserved(slot.slot_id);
            }
        }

        let heap = inner.waiters.entry(provider.to_string()).or_default();
        if !heap.iter().any(|w| w.subtask_id == subtask_id) {
            heap.push(WaitEntry { subtask_id: subtask_id.to_string(), submitted_at: Instant::now() });
        }
        ReserveResult::Queued
    }

    /// Block until a slot on `provider` is reserved for `subtask_id`, or
    /// until `cancelled` fires first.
    pub async fn acquire(&self, provider: &str, subtask_id: &str, cancelled: &tokio::sync::Notify) -> Option<u32> {
        loop {
            match self.try_reserve(provider, subtask_id).await {
                ReserveResult::Reserved(slot_id) => return Some(slot_id),
                ReserveResult::Queued => {
                    tokio::select! {
                        _ = self.notify.notified() => continue,
                        _ = cancelled.notified() => return None,
                    }
                }
            }
        }
    }

    /// Release `slot_id` back to Idle (success path) and wake one waiter.
    pub async fn release_success(&self, slot_id: u32, latency_ms: f64) {
        let mut inner = self.inner.lock().await;
        if let Some(slot) = inner.slots.iter_mut().find(|s| s.slot_id == slot_id) {
            slot.record_success(latency_ms);
            debug!(slot_id, latency_ms, "slot released after success");
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Release `slot_id` into Cooling (failure path) for `cooldown`.
    pub async fn release_failure(&self, slot_id: u32, cooldown: std::time::Duration) {
        let mut inner = self.inner.lock().await;
        if let Some(slot) = inner.slots.iter_mut().find(|s| s.slot_id == slot_id) {
            slot.record_failure(cooldown);
        }
    }

    /// Mark a reserved slot as dispatched (`Reserved -> InFlight`).
    pub async fn mark_in_flight(&self, slot_id: u32) {
        let mut inner = self.inner.lock().await;
        if let Some(slot) = inner.slots.iter_mut().find(|s| s.slot_id == slot_id) {
            slot.mark_in_flight();
        }
    }

    /// Transition any `Cooling` slot whose cooldown has elapsed back to
    /// `Idle`, then wake waiters. Intended to run on a periodic tick.
    pub async fn tick_cooldowns(&self) {
        let mut inner = self.inner.lock().await;
        let mut any_recovered = false;
        for slot in inner.slots.iter_mut() {
            let was_cooling = slot.state == SlotState::Cooling;
            slot.tick_cooldown();
            if was_cooling && slot.state == SlotState::Idle {
                any_recovered = true;
            }
        }
        drop(inner);
        if any_recovered {
            self.notify.notify_waiters();
        }
    }

    pub async fn snapshot(&self) -> Vec<WorkerSlot> {
        self.inner.lock().await.slots.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(id: u32, provider: &str) -> WorkerSlot {
        WorkerSlot::new(id, provider, "test-model")
    }

    #[tokio::test]
    async fn reserves_idle_slot_immediately() {
        let scheduler = SlotScheduler::new(vec![slot(1, "openai")]);
        let result = scheduler.try_reserve("openai", "s1").await;
        assert_eq!(result, ReserveResult::Reserved(1));
    }

    #[tokio::test]
    async fn queues_when_no_idle_slot_for_provider() {
        let scheduler = SlotScheduler::new(vec![slot(1, "openai")]);
        scheduler.try_reserve("openai", "s1").await;
        let result = scheduler.try_reserve("openai", "s2").await;
        assert_eq!(result, ReserveResult::Queued);
    }

    #[tokio::test]
    async fn release_makes_slot_reservable_again() {
        let scheduler = SlotScheduler::new(vec![slot(1, "openai")]);
        scheduler.try_reserve("openai", "s1").await;
        scheduler.mark_in_flight(1).await;
        scheduler.release_success(1, 50.0).await;

        let result = scheduler.try_reserve("openai", "s2").await;
        assert_eq!(result, ReserveResult::Reserved(1));
    }

    #[tokio::test]
    async fn acquire_unblocks_on_cancellation() {
        let scheduler = SlotScheduler::new(vec![slot(1, "openai")]);
        scheduler.try_reserve("openai", "s1").await; // takes the only slot

        let cancel = tokio::sync::Notify::new();
        let fut = scheduler.acquire("openai", "s2", &cancel);
        tokio::pin!(fut);

        tokio::select! {
            _ = &mut fut => panic!("should not have acquired"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(20)) => {}
        }
        cancel.notify_waiters();
        assert_eq!(fut.await, None);
    }

    #[tokio::test]
    async fn cooldown_tick_recovers_slot_and_wakes_waiters() {
        let scheduler = SlotScheduler::new(vec![slot(1, "openai")]);
        scheduler.try_reserve("openai", "s1").await;
        scheduler.mark_in_flight(1).await;
        scheduler.release_failure(1, std::time::Duration::from_millis(1)).await;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        scheduler.tick_cooldowns().await;

        let result = scheduler.try_reserve("openai", "s2").await;
        assert_eq!(result, ReserveResult::Reserved(1));
    }
}
