//! LLM request/response types, provider-agnostic enough to address any
//! OpenAI-compatible completion endpoint.

use serde::{Deserialize, Serialize};

/// A completion request — everything needed for one call to a Worker Slot.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, content: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: text.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Response from a completion request.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub stop_reason: StopReason,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

impl StopReason {
    /// Parse an OpenAI-compatible `finish_reason` field.
    pub fn from_finish_reason(s: &str) -> Self {
        match s {
            "length" => StopReason::MaxTokens,
            "stop" => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        }
    }
}

/// Token usage for cost tracking (§10.7 supplemented feature).
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
}

impl TokenUsage {
    /// Derived cost estimate in USD. Pricing table is implementation-defined
    /// (the spec does not name it); used for ledger observability only.
    pub fn cost_usd(&self, model: &str) -> f64 {
        let (input_price, output_price) = match model {
            m if m.contains("large") || m.contains("opus") || m.contains("70b") => (5.0, 15.0),
            m if m.contains("mini") || m.contains("haiku") || m.contains("8b") => (0.15, 0.6),
            _ => (1.0, 3.0),
        };

        let input_cost = (self.input_tokens as f64 / 1_000_000.0) * input_price;
        let output_cost = (self.output_tokens as f64 / 1_000_000.0) * output_price;
        let cache_cost = (self.cache_read_tokens as f64 / 1_000_000.0) * input_price * 0.1;
        input_cost + output_cost + cache_cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_set_role() {
        assert_eq!(Message::user("hi").role, Role::User);
        assert_eq!(Message::system("sys").role, Role::System);
    }

    #[test]
    fn stop_reason_maps_openai_finish_reasons() {
        assert_eq!(StopReason::from_finish_reason("length"), StopReason::MaxTokens);
        assert_eq!(StopReason::from_finish_reason("stop"), StopReason::StopSequence);
        assert_eq!(StopReason::from_finish_reason("weird"), StopReason::EndTurn);
    }

    #[test]
    fn cost_usd_scales_with_tier() {
        let usage = TokenUsage { input_tokens: 1_000_000, output_tokens: 1_000_000, cache_read_tokens: 0 };
        assert!(usage.cost_usd("big-opus-model") > usage.cost_usd("fast-mini-model"));
    }
}
