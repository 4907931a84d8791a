//! Metrics sinks for Drafthorse.
//!
//! Two interchangeable `MetricsSink` implementations: a structured-logging
//! sink (default) and a Prometheus sink with an optional HTTP exporter.

pub mod logging;
pub mod prometheus_sink;

pub use logging::LoggingMetricsSink;
pub use prometheus_sink::PrometheusMetricsSink;
