//! Pluggable LLM client trait and an OpenAI-compatible HTTP implementation.

use async_trait::async_trait;
use serde::Deserialize;

use super::error::LlmError;
use super::types::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};

/// One upstream endpoint's completion call. One implementation per
/// wire-compatible provider family; today only OpenAI-compatible bodies.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint, backed
/// by a persistent `reqwest::Client` with HTTP/2 enabled and a 90s idle pool
/// timeout per provider (§4.2).
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    credential: String,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: impl Into<String>, credential: impl Into<String>) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .http2_prior_knowledge()
            .build()?;
        Ok(Self { http, base_url: base_url.into(), credential: credential.into() })
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: ChatUsage,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: String,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    #[serde(default)]
    prompt_tokens_cached: u64,
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.credential)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(std::time::Duration::from_secs)
                .unwrap_or(std::time::Duration::from_millis(100));
            return Err(LlmError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status: status.as_u16(), message });
        }

        let body: ChatCompletionResponse = response.json().await?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("empty choices array".to_string()))?;

        Ok(CompletionResponse {
            content: choice.message.content,
            stop_reason: StopReason::from_finish_reason(&choice.finish_reason),
            usage: TokenUsage {
                input_tokens: body.usage.prompt_tokens,
                output_tokens: body.usage.completion_tokens,
                cache_read_tokens: body.usage.prompt_tokens_cached,
            },
        })
    }
}

/// Deterministic in-memory client for tests: echoes the last user message
/// back, optionally after a scripted failure.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub struct MockLlmClient {
        scripted_errors: Mutex<Vec<LlmError>>,
        calls: AtomicUsize,
    }

    impl MockLlmClient {
        pub fn new() -> Self {
            Self { scripted_errors: Mutex::new(Vec::new()), calls: AtomicUsize::new(0) }
        }

        /// Errors are returned in order, oldest first, before falling back
        /// to a successful echo response.
        pub fn with_scripted_errors(errors: Vec<LlmError>) -> Self {
            Self { scripted_errors: Mutex::new(errors), calls: AtomicUsize::new(0) }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Default for MockLlmClient {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(err) = self.scripted_errors.lock().unwrap().pop() {
                return Err(err);
            }

            let echoed = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(CompletionResponse {
                content: format!("echo: {echoed}"),
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage { input_tokens: 10, output_tokens: 10, cache_read_tokens: 0 },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockLlmClient;
    use super::*;

    #[tokio::test]
    async fn mock_client_echoes_last_message() {
        let client = MockLlmClient::new();
        let request = CompletionRequest {
            model: "test-model".to_string(),
            messages: vec![super::super::types::Message::user("hello")],
            max_tokens: 100,
            temperature: 0.0,
        };
        let response = client.complete(request).await.unwrap();
        assert_eq!(response.content, "echo: hello");
    }

    #[tokio::test]
    async fn mock_client_replays_scripted_errors_first() {
        let client = MockLlmClient::with_scripted_errors(vec![LlmError::ApiError { status: 503, message: "x".into() }]);
        let request = CompletionRequest {
            model: "test-model".to_string(),
            messages: vec![super::super::types::Message::user("hello")],
            max_tokens: 100,
            temperature: 0.0,
        };
        assert!(client.complete(request.clone()).await.is_err());
        assert!(client.complete(request).await.is_ok());
        assert_eq!(client.call_count(), 2);
    }
}
