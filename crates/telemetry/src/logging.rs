//! Default metrics sink that emits one structured tracing event per message.

use drafthorse_core::metrics::{MetricsEvent, MetricsSink};
use tracing::info;

/// Metrics sink backed by the process log.
pub struct LoggingMetricsSink;

impl MetricsSink for LoggingMetricsSink {
    fn name(&self) -> &str { "logging" }

    fn record(&self, event: &MetricsEvent) {
        info!(
            target: "drafthorse::metrics",
            agent_id = %event.agent_id,
            message_id = %event.message_id,
            sender = %event.sender,
            status = %event.status,
            provider = event.provider.as_deref(),
            duration_ms = event.duration_ms,
            attempts = event.attempts,
            retryable = event.retryable,
            error_code = event.error_code.as_deref(),
            "prompt_metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drafthorse_core::metrics::ProcessStatus;

    #[test]
    fn record_does_not_panic_on_sparse_event() {
        let sink = LoggingMetricsSink;
        sink.record(&MetricsEvent {
            agent_id: "agent-a".into(),
            message_id: "m1".into(),
            sender: "alpha".into(),
            status: ProcessStatus::Success,
            provider: Some("openai".into()),
            duration_ms: 42.0,
            attempts: 1,
            retryable: None,
            error_code: None,
        });
    }
}
