//! Prometheus metrics sink with an optional HTTP exporter.
//!
//! Series:
//! - `drafthorse_prompt_events_total{agent_id, status, provider, retryable, error_code}`
//! - `drafthorse_prompt_duration_seconds{agent_id, status, provider}`
//! - `drafthorse_prompt_attempts{agent_id, status}` (buckets 1..5, 10)

use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use drafthorse_core::metrics::{MetricsEvent, MetricsSink};
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use tracing::{error, info};

/// Metrics sink backed by a Prometheus registry.
pub struct PrometheusMetricsSink {
    registry: Registry,
    events: CounterVec,
    duration: HistogramVec,
    attempts: HistogramVec,
}

impl PrometheusMetricsSink {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let events = CounterVec::new(
            Opts::new(
                "drafthorse_prompt_events_total",
                "Total prompt processing events",
            ),
            &["agent_id", "status", "provider", "retryable", "error_code"],
        )?;
        registry.register(Box::new(events.clone()))?;

        let duration = HistogramVec::new(
            HistogramOpts::new(
                "drafthorse_prompt_duration_seconds",
                "Prompt handling duration",
            ),
            &["agent_id", "status", "provider"],
        )?;
        registry.register(Box::new(duration.clone()))?;

        let attempts = HistogramVec::new(
            HistogramOpts::new("drafthorse_prompt_attempts", "Prompt handling attempts")
                .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0, 10.0]),
            &["agent_id", "status"],
        )?;
        registry.register(Box::new(attempts.clone()))?;

        Ok(Self {
            registry,
            events,
            duration,
            attempts,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Spawn the `GET /metrics` exporter on the given port.
    pub fn spawn_exporter(&self, port: u16) -> tokio::task::JoinHandle<()> {
        let registry = self.registry.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_exporter(registry, port).await {
                error!(error = %e, port, "Metrics exporter failed");
            }
        })
    }
}

impl MetricsSink for PrometheusMetricsSink {
    fn name(&self) -> &str { "prometheus" }

    fn record(&self, event: &MetricsEvent) {
        let provider = event.provider.as_deref().unwrap_or("unknown");
        let retryable = match event.retryable {
            Some(true) => "true",
            Some(false) => "false",
            None => "unknown",
        };
        let error_code = event.error_code.as_deref().unwrap_or("none");

        self.events
            .with_label_values(&[
                event.agent_id.as_str(),
                event.status.as_str(),
                provider,
                retryable,
                error_code,
            ])
            .inc();
        self.duration
            .with_label_values(&[event.agent_id.as_str(), event.status.as_str(), provider])
            .observe((event.duration_ms / 1000.0).max(0.0));
        self.attempts
            .with_label_values(&[event.agent_id.as_str(), event.status.as_str()])
            .observe(f64::from(event.attempts));
    }
}

async fn metrics_handler(State(registry): State<Registry>) -> impl IntoResponse {
    let families = registry.gather();
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        buffer,
    )
}

async fn serve_exporter(registry: Registry, port: u16) -> std::io::Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "Metrics exporter listening");
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use drafthorse_core::metrics::ProcessStatus;

    fn success_event() -> MetricsEvent {
        MetricsEvent {
            agent_id: "agent-a".into(),
            message_id: "m1".into(),
            sender: "alpha".into(),
            status: ProcessStatus::Success,
            provider: Some("openai".into()),
            duration_ms: 1500.0,
            attempts: 1,
            retryable: None,
            error_code: None,
        }
    }

    #[test]
    fn record_increments_event_counter() {
        let sink = PrometheusMetricsSink::new().unwrap();
        sink.record(&success_event());
        sink.record(&success_event());

        let count = sink
            .events
            .with_label_values(&["agent-a", "success", "openai", "unknown", "none"])
            .get();
        assert_eq!(count, 2.0);
    }

    #[test]
    fn error_event_uses_placeholder_labels() {
        let sink = PrometheusMetricsSink::new().unwrap();
        let mut event = success_event();
        event.status = ProcessStatus::Error;
        event.provider = None;
        event.retryable = Some(false);
        event.error_code = Some("invalid_payload".into());
        event.attempts = 0;
        sink.record(&event);

        let count = sink
            .events
            .with_label_values(&["agent-a", "error", "unknown", "false", "invalid_payload"])
            .get();
        assert_eq!(count, 1.0);
    }

    #[test]
    fn duration_recorded_in_seconds() {
        let sink = PrometheusMetricsSink::new().unwrap();
        sink.record(&success_event());

        let histogram = sink
            .duration
            .with_label_values(&["agent-a", "success", "openai"]);
        assert_eq!(histogram.get_sample_count(), 1);
        assert!((histogram.get_sample_sum() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn attempts_histogram_counts_events() {
        let sink = PrometheusMetricsSink::new().unwrap();
        let mut event = success_event();
        event.attempts = 3;
        sink.record(&event);

        let histogram = sink.attempts.with_label_values(&["agent-a", "success"]);
        assert_eq!(histogram.get_sample_count(), 1);
        assert!((histogram.get_sample_sum() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn exporter_renders_text_format() {
        let sink = PrometheusMetricsSink::new().unwrap();
        sink.record(&success_event());

        let families = sink.registry().gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("drafthorse_prompt_events_total"));
        assert!(text.contains("drafthorse_prompt_duration_seconds"));
    }
}
