//! ContextStore trait — per-conversation turn history with expiry.
//!
//! Keyed by `agent_id:thread_id`. The value is an ordered turn list,
//! append-only in practice: every successful exchange adds a user turn and an
//! assistant turn. Lifetime is governed by a sliding TTL refreshed on every
//! write.
//!
//! Implementations: no-op (feature disabled), in-memory (testing), Redis
//! (production).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ContextError;

/// One turn of a stored conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextTurn {
    /// "user" or "assistant"
    pub role: String,

    /// The turn text
    pub content: String,
}

impl ContextTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

/// Stored conversation state: an ordered, order-significant turn list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    #[serde(default)]
    pub messages: Vec<ContextTurn>,
}

impl ConversationContext {
    /// Append a completed exchange: the user prompt, then the assistant
    /// response.
    pub fn push_exchange(&mut self, prompt: impl Into<String>, response: impl Into<String>) {
        self.messages.push(ContextTurn::user(prompt));
        self.messages.push(ContextTurn::assistant(response));
    }
}

/// Derive the storage key for a conversation.
pub fn context_key(agent_id: &str, thread_id: &str) -> String {
    format!("{agent_id}:{thread_id}")
}

/// The core ContextStore trait.
///
/// All implementations must be safe under concurrent invocation from multiple
/// simultaneous pipeline executions sharing one instance.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// The store name (e.g. "redis", "in_memory", "none").
    fn name(&self) -> &str;

    /// Retrieve stored context for the given key.
    async fn get(
        &self,
        key: &str,
    ) -> std::result::Result<Option<ConversationContext>, ContextError>;

    /// Store context. A TTL of zero means "persist without expiry".
    async fn set(
        &self,
        key: &str,
        value: &ConversationContext,
        ttl_secs: u64,
    ) -> std::result::Result<(), ContextError>;

    /// Remove stored context.
    async fn clear(&self, key: &str) -> std::result::Result<(), ContextError>;
}
