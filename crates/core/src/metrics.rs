//! MetricsSink trait — one structured event per processed message.

use serde::{Deserialize, Serialize};

/// Terminal outcome of one processed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Success,
    Error,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured metrics payload — exactly one emitted per inbound message,
/// success or error path, including validation rejections (attempts = 0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsEvent {
    pub agent_id: String,
    pub message_id: String,
    pub sender: String,
    pub status: ProcessStatus,
    /// Backend name; absent on the error path
    pub provider: Option<String>,
    pub duration_ms: f64,
    pub attempts: u32,
    /// Whether the terminal error was retryable; absent on success
    pub retryable: Option<bool>,
    /// Terminal error code; absent on success
    pub error_code: Option<String>,
}

/// Sink for metrics events.
///
/// `record` is synchronous and must be safe to call from multiple concurrent
/// pipeline executions.
pub trait MetricsSink: Send + Sync {
    /// The sink name (e.g. "logging", "prometheus").
    fn name(&self) -> &str;

    /// Persist or emit the metrics event.
    fn record(&self, event: &MetricsEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ProcessStatus::Success).unwrap();
        assert_eq!(json, "\"success\"");
        assert_eq!(ProcessStatus::Error.to_string(), "error");
    }

    #[test]
    fn event_roundtrip() {
        let event = MetricsEvent {
            agent_id: "agent-a".into(),
            message_id: "m1".into(),
            sender: "alpha".into(),
            status: ProcessStatus::Error,
            provider: None,
            duration_ms: 12.5,
            attempts: 3,
            retryable: Some(false),
            error_code: Some("llm_error".into()),
        };
        let json = serde_json::to_string(&event).unwrap();
        let decoded: MetricsEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.attempts, 3);
        assert_eq!(decoded.error_code.as_deref(), Some("llm_error"));
    }
}
