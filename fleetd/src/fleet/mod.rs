//! Agent Fleet: executes a subtask against the Worker Slot and provider a
//! routing decision named, with pooling, retry, and provider failover
//! (§4.2).

pub mod scheduler;

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::Notify;
use tracing::{info, warn};

use crate::domain::{LastErrorKind, Subtask, WorkerSlot};
use crate::llm::{ConnectionPool, CompletionRequest, Message};
use crate::router::{ProviderHealth, RoutingDecision};
use scheduler::SlotScheduler;

/// Successful execution output (§4.2 `Execute` return value).
#[derive(Debug, Clone)]
pub struct Output {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub usage: crate::llm::TokenUsage,
}

/// Outcomes `Fleet::execute` can surface to the Orchestrator (§7). Anything
/// not listed here (`RateLimited`, `TransientUpstream`) is recovered inside
/// the Connection Pool and never reaches this layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecuteError {
    #[error("subtask exceeded its strategy timeout")]
    Timeout,
    #[error("all retries exhausted for provider {0}")]
    ProviderExhausted(String),
    #[error("execution cancelled")]
    Cancelled,
}

impl ExecuteError {
    pub fn as_last_error_kind(&self) -> LastErrorKind {
        match self {
            ExecuteError::Timeout => LastErrorKind::Timeout,
            ExecuteError::ProviderExhausted(_) => LastErrorKind::ProviderExhausted,
            ExecuteError::Cancelled => LastErrorKind::None,
        }
    }
}

/// Cooldown applied to a slot after a failed call, before it becomes
/// reservable again (not named numerically in the source spec; chosen to
/// match the Connection Pool's base backoff).
const FAILURE_COOLDOWN: std::time::Duration = std::time::Duration::from_millis(500);

/// Owns the Worker Slot pool and the Connection Pool, and exposes the one
/// public `Execute` operation (§4.2).
pub struct Fleet {
    scheduler: SlotScheduler,
    pool: ConnectionPool,
    concurrency_caps: HashMap<String, u32>,
}

impl Fleet {
    pub fn new(slots: Vec<WorkerSlot>, pool: ConnectionPool, concurrency_caps: HashMap<String, u32>) -> Self {
        Self { scheduler: SlotScheduler::new(slots), pool, concurrency_caps }
    }

    /// Execute `subtask` against the provider/model the Router selected.
    /// Blocks on acquiring a Worker Slot; `cancelled` interrupts that block
    /// (§4.1 Dispatch: "cancellation must interrupt this block").
    pub async fn execute(
        &self,
        subtask: &Subtask,
        decision: &RoutingDecision,
        timeout: std::time::Duration,
        cancelled: &Notify,
    ) -> Result<Output, ExecuteError> {
        let Some(slot_id) = self.scheduler.acquire(decision.provider(), &subtask.id, cancelled).await else {
            return Err(ExecuteError::Cancelled);
        };
        self.scheduler.mark_in_flight(slot_id).await;

        let request = CompletionRequest {
            model: decision.model().to_string(),
            messages: vec![Message::user(subtask.description.clone())],
            max_tokens: 4096,
            temperature: 0.0,
        };

        let started = Instant::now();
        let call = self.pool.call(decision.provider(), request);

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(response)) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.scheduler.release_success(slot_id, latency_ms).await;
                info!(subtask_id = %subtask.id, provider = decision.provider(), latency_ms, "subtask executed");
                Ok(Output { content: response.content, provider: decision.provider().to_string(), model: decision.model().to_string(), usage: response.usage })
            }
            Ok(Err(err)) => {
                self.scheduler.release_failure(slot_id, FAILURE_COOLDOWN).await;
                warn!(subtask_id = %subtask.id, provider = decision.provider(), error = %err, "subtask exhausted retries");
                Err(ExecuteError::ProviderExhausted(decision.provider().to_string()))
            }
            Err(_elapsed) => {
                self.scheduler.release_failure(slot_id, FAILURE_COOLDOWN).await;
                Err(ExecuteError::Timeout)
            }
        }
    }

    /// Health snapshot for the Router's selection rule (§4.3).
    pub async fn provider_health(&self) -> HashMap<String, ProviderHealth> {
        let slots = self.scheduler.snapshot().await;
        crate::router::aggregate_health(&slots, &self.concurrency_caps)
    }

    /// Recover any slots whose Cooling period has elapsed. Intended to be
    /// driven by a periodic background tick.
    pub async fn tick_cooldowns(&self) {
        self.scheduler.tick_cooldowns().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::router::RoutingDecision;
    use std::sync::Arc;

    fn fleet_with_mock() -> Fleet {
        let mut clients: HashMap<String, Arc<dyn crate::llm::LlmClient>> = HashMap::new();
        clients.insert("openai".to_string(), Arc::new(MockLlmClient::new()));
        let provider = crate::domain::Provider {
            name: "openai".to_string(),
            base_url: "http://localhost".to_string(),
            credential: "test".to_string(),
            models: vec!["gpt-test".to_string()],
            concurrency_cap: 4,
            token_budget_per_minute: None,
        };
        let pool = ConnectionPool::new(&[provider], clients, None);
        let mut caps = HashMap::new();
        caps.insert("openai".to_string(), 4);
        Fleet::new(vec![WorkerSlot::new(1, "openai", "gpt-test")], pool, caps)
    }

    #[tokio::test]
    async fn execute_succeeds_and_releases_slot() {
        let fleet = fleet_with_mock();
        let subtask = Subtask::new("t1", "do the thing", crate::router::Strategy::Standard);
        let decision = RoutingDecision::Selected { provider: "openai".to_string(), model: "gpt-test".to_string() };
        let cancel = Notify::new();

        let output = fleet.execute(&subtask, &decision, std::time::Duration::from_secs(1), &cancel).await.unwrap();
        assert!(output.content.starts_with("echo:"));

        let health = fleet.provider_health().await;
        assert_eq!(health.get("openai").unwrap().in_flight, 0);
    }

    #[tokio::test]
    async fn execute_times_out_when_call_outlasts_deadline() {
        struct SlowClient;
        #[async_trait::async_trait]
        impl crate::llm::LlmClient for SlowClient {
            async fn complete(&self, _request: CompletionRequest) -> Result<crate::llm::CompletionResponse, crate::llm::LlmError> {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                unreachable!()
            }
        }

        let mut clients: HashMap<String, Arc<dyn crate::llm::LlmClient>> = HashMap::new();
        clients.insert("openai".to_string(), Arc::new(SlowClient));
        let provider = crate::domain::Provider {
            name: "openai".to_string(),
            base_url: "http://localhost".to_string(),
            credential: "test".to_string(),
            models: vec!["gpt-test".to_string()],
            concurrency_cap: 4,
            token_budget_per_minute: None,
        };
        let pool = ConnectionPool::new(&[provider], clients, None);
        let fleet = Fleet::new(vec![WorkerSlot::new(1, "openai", "gpt-test")], pool, HashMap::new());

        let subtask = Subtask::new("t1", "do the thing", crate::router::Strategy::Fast);
        let decision = RoutingDecision::Selected { provider: "openai".to_string(), model: "gpt-test".to_string() };
        let cancel = Notify::new();

        let err = fleet.execute(&subtask, &decision, std::time::Duration::from_millis(10), &cancel).await.unwrap_err();
        assert!(matches!(err, ExecuteError::Timeout));
    }
}
