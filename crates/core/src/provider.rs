//! Provider trait — the abstraction over generation backends.
//!
//! A Provider turns a normalized prompt request into a response or a
//! classified error. The pipeline calls `generate()` without knowing which
//! backend is configured — pure polymorphism.
//!
//! Implementations: OpenAI-compatible endpoints, scripted mocks in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::ConversationContext;

/// A normalized prompt request passed to provider adapters.
///
/// Constructed once at pipeline entry from the inbound payload; immutable
/// once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    /// The prompt text (validated non-empty)
    pub prompt: String,

    /// Provider options, merged from process defaults and per-message
    /// overrides
    #[serde(default)]
    pub options: Map<String, Value>,

    /// Opaque metadata echoed back verbatim in the response envelope
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Prior conversation state, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ConversationContext>,

    /// Conversation identity used to key stored history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    /// Logical return address of the producer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    /// Identity of the originating log entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Structured provider output consumed by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Generated text
    pub content: String,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// Backend-assigned request identity
    pub request_id: String,

    /// Token/resource accounting
    #[serde(default)]
    pub usage: Map<String, Value>,

    /// Backend name (e.g. "openai")
    pub provider: String,
}

/// The sole error currency crossing the provider boundary.
///
/// `code` is open-ended: backends define their own codes, and the pipeline
/// adds `invalid_payload` and `unhandled_error` for failures it classifies
/// itself. `retryable` drives the bounded-retry policy.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable,
            details: Map::new(),
        }
    }

    /// Attach a detail entry.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Malformed inbound payload — never retried, never reaches a backend.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::new("invalid_payload", message, false)
    }

    /// A failure the adapter did not classify — never retried.
    pub fn unhandled(message: impl Into<String>) -> Self {
        Self::new("unhandled_error", message, false)
    }
}

/// The core Provider trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this backend (e.g. "openai").
    fn name(&self) -> &str;

    /// Produce a model response for the given prompt.
    async fn generate(
        &self,
        request: &PromptRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Release backend resources during an orderly stop.
    async fn close(&self) -> std::result::Result<(), ProviderError> {
        Ok(())
    }
}
