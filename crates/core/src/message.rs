//! Inbound message and response envelope types.
//!
//! These are the value objects that flow through the system: a peer appends a
//! prompt message to the agent's inbox stream → the pipeline processes it →
//! the agent publishes exactly one response envelope back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::provider::{ProviderError, ProviderResponse};

/// Message type attached to every outbound response envelope.
pub const RESPONSE_MESSAGE_TYPE: &str = "agent_response";

/// A message delivered from the mailbox transport.
///
/// The pipeline borrows an `InboundMessage` for the duration of one
/// processing call and never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Unique identity of the log entry this message arrived as
    pub message_id: String,

    /// Logical return address of the producer
    pub sender: String,

    /// The agent this message was addressed to
    pub recipient: String,

    /// Untyped structured payload; validated into a `PromptRequest` at
    /// pipeline entry
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl InboundMessage {
    pub fn new(
        message_id: impl Into<String>,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            sender: sender.into(),
            recipient: recipient.into(),
            payload,
        }
    }
}

/// Build the outbound success envelope for a provider response.
pub fn success_envelope(
    message: &InboundMessage,
    response: &ProviderResponse,
    thread_id: Option<&str>,
    metadata: &Map<String, Value>,
) -> Value {
    json!({
        "status": "success",
        "response": {
            "content": response.content,
            "model": response.model,
            "usage": response.usage,
            "provider": response.provider,
        },
        "request_id": response.request_id,
        "message_id": message.message_id,
        "correlation": {
            "sender": message.sender,
            "thread_id": thread_id,
        },
        "metadata": metadata,
    })
}

/// Build the outbound error envelope for a terminal failure.
pub fn error_envelope(
    message: &InboundMessage,
    error: &ProviderError,
    metadata: &Map<String, Value>,
) -> Value {
    json!({
        "status": "error",
        "error": {
            "code": error.code,
            "message": error.message,
            "retryable": error.retryable,
            "details": error.details,
        },
        "message_id": message.message_id,
        "correlation": {
            "sender": message.sender,
        },
        "metadata": metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_message() -> InboundMessage {
        let mut payload = Map::new();
        payload.insert("prompt".into(), Value::String("Explain X".into()));
        InboundMessage::new("msg-1", "alpha", "agent-a", payload)
    }

    #[test]
    fn inbound_message_roundtrip() {
        let msg = test_message();
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: InboundMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.message_id, "msg-1");
        assert_eq!(decoded.payload["prompt"], "Explain X");
    }

    #[test]
    fn success_envelope_shape() {
        let msg = test_message();
        let response = ProviderResponse {
            content: "answer".into(),
            model: "gpt-4o-mini".into(),
            request_id: "req-9".into(),
            usage: Map::new(),
            provider: "openai".into(),
        };
        let envelope = success_envelope(&msg, &response, Some("t1"), &Map::new());
        assert_eq!(envelope["status"], "success");
        assert_eq!(envelope["response"]["content"], "answer");
        assert_eq!(envelope["request_id"], "req-9");
        assert_eq!(envelope["correlation"]["sender"], "alpha");
        assert_eq!(envelope["correlation"]["thread_id"], "t1");
    }

    #[test]
    fn error_envelope_shape() {
        let msg = test_message();
        let error = ProviderError::new("llm_error", "backend exploded", false);
        let envelope = error_envelope(&msg, &error, &Map::new());
        assert_eq!(envelope["status"], "error");
        assert_eq!(envelope["error"]["code"], "llm_error");
        assert_eq!(envelope["error"]["retryable"], false);
        assert_eq!(envelope["message_id"], "msg-1");
        // Failures are never redirected, so the envelope carries no thread id
        assert!(envelope["correlation"]["thread_id"].is_null());
    }
}
