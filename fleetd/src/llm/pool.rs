//! Multi-Provider Connection Pool: per-provider concurrency/token-budget
//! gating, retry with exponential backoff and jitter, and an optional
//! response cache (§4.2).
//!
//! Grounded on the source repo's `Scheduler` (`src/scheduler/core.rs`):
//! the sliding-window rate accounting and `Notify`-based slot waiting are the
//! same idiom, applied here to provider token budgets instead of loop
//! concurrency.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::domain::Provider;
use crate::llm::client::LlmClient;
use crate::llm::error::LlmError;
use crate::llm::types::{CompletionRequest, CompletionResponse};

const BASE_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 5;

struct TokenBudget {
    budget_per_minute: u64,
    window: StdMutex<VecDeque<(Instant, u64)>>,
}

impl TokenBudget {
    fn new(budget_per_minute: u64) -> Self {
        Self { budget_per_minute, window: StdMutex::new(VecDeque::new()) }
    }

    /// True if consuming `tokens` now would stay within the per-minute budget.
    fn try_consume(&self, tokens: u64) -> bool {
        let mut window = self.window.lock().unwrap();
        let now = Instant::now();
        while window.front().map(|(t, _)| now.duration_since(*t) > Duration::from_secs(60)).unwrap_or(false) {
            window.pop_front();
        }
        let used: u64 = window.iter().map(|(_, n)| n).sum();
        if used + tokens > self.budget_per_minute {
            return false;
        }
        window.push_back((now, tokens));
        true
    }
}

struct CacheEntry {
    response_content: String,
    inserted_at: Instant,
}

/// Response cache keyed on (provider, model, hashed request body), disabled
/// by default — only safe to enable for deterministic (temperature = 0,
/// non-streaming) calls (§4.2).
pub struct ResponseCache {
    ttl: Duration,
    entries: StdMutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: StdMutex::new(HashMap::new()) }
    }

    fn key(provider: &str, request: &CompletionRequest) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(provider.as_bytes());
        hasher.update(request.model.as_bytes());
        hasher.update(serde_json::to_vec(request).unwrap_or_default());
        hex::encode(hasher.finalize())
    }

    fn get(&self, provider: &str, request: &CompletionRequest) -> Option<String> {
        let key = Self::key(provider, request);
        let entries = self.entries.lock().unwrap();
        entries.get(&key).filter(|e| e.inserted_at.elapsed() < self.ttl).map(|e| e.response_content.clone())
    }

    fn put(&self, provider: &str, request: &CompletionRequest, content: &str) {
        let key = Self::key(provider, request);
        self.entries.lock().unwrap().insert(key, CacheEntry { response_content: content.to_string(), inserted_at: Instant::now() });
    }
}

struct ProviderGate {
    semaphore: Semaphore,
    budget: Option<TokenBudget>,
}

/// Process-wide pool of per-provider gates and clients, one per configured
/// Provider, living the process lifetime (§5 shared resource policy).
pub struct ConnectionPool {
    clients: HashMap<String, std::sync::Arc<dyn LlmClient>>,
    gates: HashMap<String, ProviderGate>,
    cache: Option<ResponseCache>,
}

impl ConnectionPool {
    pub fn new(providers: &[Provider], clients: HashMap<String, std::sync::Arc<dyn LlmClient>>, cache_ttl: Option<Duration>) -> Self {
        let mut gates = HashMap::new();
        for provider in providers {
            gates.insert(
                provider.name.clone(),
                ProviderGate {
                    semaphore: Semaphore::new(provider.concurrency_cap as usize),
                    budget: provider.token_budget_per_minute.map(TokenBudget::new),
                },
            );
        }
        Self { clients, gates, cache: cache_ttl.map(ResponseCache::new) }
    }

    /// Execute one completion call against `provider`, respecting its
    /// concurrency cap and token budget, retrying transport errors and 5xx
    /// with exponential backoff + jitter up to `MAX_ATTEMPTS` (§4.2).
    pub async fn call(&self, provider: &str, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if let (Some(cache), estimated_tokens) = (&self.cache, request.max_tokens as u64) {
            if request.temperature == 0.0 {
                if let Some(cached) = cache.get(provider, &request) {
                    debug!(provider, "connection pool cache hit");
                    return Ok(CompletionResponse {
                        content: cached,
                        stop_reason: crate::llm::types::StopReason::EndTurn,
                        usage: crate::llm::types::TokenUsage { input_tokens: 0, output_tokens: 0, cache_read_tokens: estimated_tokens },
                    });
                }
            }
        }

        let gate = self.gates.get(provider).ok_or_else(|| LlmError::InvalidResponse(format!("unknown provider {provider}")))?;
        let client = self.clients.get(provider).ok_or_else(|| LlmError::InvalidResponse(format!("unknown provider {provider}")))?;

        if let Some(budget) = &gate.budget {
            if !budget.try_consume(request.max_tokens as u64) {
                return Err(LlmError::RateLimited { retry_after: Duration::from_secs(1) });
            }
        }

        let _permit = gate.semaphore.acquire().await.map_err(|_| LlmError::InvalidResponse("pool closed".to_string()))?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match client.complete(request.clone()).await {
                Ok(response) => {
                    if let Some(cache) = &self.cache {
                        if request.temperature == 0.0 {
                            cache.put(provider, &request, &response.content);
                        }
                    }
                    return Ok(response);
                }
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let backoff = err.retry_after().unwrap_or_else(|| backoff_for_attempt(attempt));
                    warn!(provider, attempt, ?backoff, "retrying after retryable llm error");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn backoff_for_attempt(attempt: u32) -> Duration {
    let exp = BASE_BACKOFF.saturating_mul(1u32 << attempt.min(8));
    let capped = exp.min(MAX_BACKOFF);
    let jitter_ms = rand::rng().random_range(0..=capped.as_millis() as u64 / 4 + 1);
    capped + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::types::Message;

    fn provider(name: &str, cap: u32) -> Provider {
        Provider {
            name: name.to_string(),
            base_url: "http://localhost".to_string(),
            credential: "test".to_string(),
            models: vec!["test-model".to_string()],
            concurrency_cap: cap,
            token_budget_per_minute: None,
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "test-model".to_string(),
            messages: vec![Message::user("hi")],
            max_tokens: 10,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn call_retries_retryable_errors_then_succeeds() {
        let mut clients: HashMap<String, std::sync::Arc<dyn LlmClient>> = HashMap::new();
        clients.insert(
            "p1".to_string(),
            std::sync::Arc::new(MockLlmClient::with_scripted_errors(vec![LlmError::ApiError { status: 503, message: "x".into() }])),
        );
        let pool = ConnectionPool::new(&[provider("p1", 4)], clients, None);

        let response = pool.call("p1", request()).await.unwrap();
        assert!(response.content.starts_with("echo:"));
    }

    #[tokio::test]
    async fn call_rejects_exhausted_token_budget() {
        let mut provider = provider("p1", 4);
        provider.token_budget_per_minute = Some(5);
        let mut clients: HashMap<String, std::sync::Arc<dyn LlmClient>> = HashMap::new();
        clients.insert("p1".to_string(), std::sync::Arc::new(MockLlmClient::new()));
        let pool = ConnectionPool::new(&[provider], clients, None);

        let mut req = request();
        req.max_tokens = 10; // exceeds the 5-token budget
        let err = pool.call("p1", req).await.unwrap_err();
        assert!(err.is_rate_limit());
    }

    #[tokio::test]
    async fn cache_hit_avoids_second_client_call() {
        let mut clients: HashMap<String, std::sync::Arc<dyn LlmClient>> = HashMap::new();
        let client = std::sync::Arc::new(MockLlmClient::new());
        clients.insert("p1".to_string(), client.clone());
        let pool = ConnectionPool::new(&[provider("p1", 4)], clients, Some(Duration::from_secs(60)));

        pool.call("p1", request()).await.unwrap();
        pool.call("p1", request()).await.unwrap();
        assert_eq!(client.call_count(), 1);
    }
}
