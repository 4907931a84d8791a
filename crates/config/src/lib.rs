//! Configuration loading and validation for Drafthorse.
//!
//! All configuration comes from `DRAFTHORSE_*` environment variables (a
//! `.env` file is loaded by the CLI before this runs). Every numeric field is
//! validated at startup; an invalid value is a hard configuration error, not
//! a warning.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Runtime configuration for the agent, immutable once loaded.
#[derive(Clone)]
pub struct AgentConfig {
    /// Logical identity of this agent; also the consumer name
    pub agent_id: String,
    /// Transport connection string (redis:// or rediss://)
    pub redis_url: String,
    /// Inbox stream this agent consumes
    pub mailbox_stream: String,
    /// Consumer group name
    pub mailbox_group: String,
    /// Fixed outbound stream; responses go to `{prefix}:{recipient}:in`
    /// when unset
    pub reply_stream: Option<String>,
    /// Stream naming prefix
    pub stream_prefix: String,
    /// Generation backend selector (e.g. "openai")
    pub provider: String,
    /// Backend credential
    pub api_key: String,
    /// Override for the backend base URL
    pub api_base_url: Option<String>,
    /// Default model requested from the backend
    pub model: String,
    pub max_tokens: u64,
    pub temperature: f64,
    /// Admission pool size (simultaneous in-flight messages)
    pub concurrency: usize,
    /// Maximum provider attempts per message
    pub retry_max: u32,
    /// Base of the exponential backoff, in seconds
    pub retry_backoff_base: f64,
    pub context_enabled: bool,
    /// Sliding TTL for stored context, in seconds (0 = no expiry)
    pub context_ttl: u64,
    /// Key prefix for the context store
    pub context_prefix: String,
    /// Context store connection string (defaults to `redis_url`)
    pub context_redis_url: String,
    /// "logging" or "prometheus"
    pub metrics_backend: String,
    /// Exporter port for the prometheus backend
    pub metrics_port: Option<u16>,
    pub log_level: String,
    /// Blocking-read window for the inbox poll loop, in seconds
    pub poll_interval: f64,
    /// Approximate trim length for outbound streams
    pub stream_maxlen: u64,
    /// Provider HTTP timeout, in seconds
    pub request_timeout: f64,
    /// Process-level default provider options
    pub default_options: Map<String, Value>,
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("agent_id", &self.agent_id)
            .field("redis_url", &self.redis_url)
            .field("mailbox_stream", &self.mailbox_stream)
            .field("mailbox_group", &self.mailbox_group)
            .field("reply_stream", &self.reply_stream)
            .field("provider", &self.provider)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("concurrency", &self.concurrency)
            .field("retry_max", &self.retry_max)
            .field("context_enabled", &self.context_enabled)
            .field("metrics_backend", &self.metrics_backend)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is required but was not provided")]
    Missing { name: String },

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },

    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

fn require(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    match vars.get(name) {
        Some(v) if !v.trim().is_empty() => Ok(v.clone()),
        _ => Err(ConfigError::Missing { name: name.into() }),
    }
}

fn parse<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match vars.get(name) {
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
            name: name.into(),
            reason: format!("{e}"),
        }),
        None => Ok(default),
    }
}

fn parse_bool(vars: &HashMap<String, String>, name: &str, default: bool) -> bool {
    match vars.get(name) {
        Some(raw) => matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

impl AgentConfig {
    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Build configuration from an explicit variable map (testing hook).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let agent_id = require(vars, "DRAFTHORSE_AGENT_ID")?;
        let redis_url = require(vars, "DRAFTHORSE_REDIS_URL")?;
        let api_key = require(vars, "DRAFTHORSE_API_KEY")?;

        let stream_prefix = vars
            .get("DRAFTHORSE_STREAM_PREFIX")
            .cloned()
            .unwrap_or_else(|| "drafthorse:mailbox".into());
        let mailbox_stream = vars
            .get("DRAFTHORSE_MAILBOX_STREAM")
            .cloned()
            .unwrap_or_else(|| format!("{stream_prefix}:{agent_id}:in"));
        let mailbox_group = vars
            .get("DRAFTHORSE_MAILBOX_GROUP")
            .cloned()
            .unwrap_or_else(|| format!("agent:{agent_id}"));
        let reply_stream = vars.get("DRAFTHORSE_REPLY_STREAM").cloned();
        let provider = vars
            .get("DRAFTHORSE_PROVIDER")
            .cloned()
            .unwrap_or_else(|| "openai".into());
        let api_base_url = vars.get("DRAFTHORSE_API_BASE_URL").cloned();
        let model = vars
            .get("DRAFTHORSE_MODEL")
            .cloned()
            .unwrap_or_else(|| "gpt-4o-mini".into());
        let context_prefix = vars
            .get("DRAFTHORSE_CONTEXT_PREFIX")
            .cloned()
            .unwrap_or_else(|| format!("drafthorse:agent:{agent_id}:context"));
        let context_redis_url = vars
            .get("DRAFTHORSE_CONTEXT_REDIS_URL")
            .cloned()
            .unwrap_or_else(|| redis_url.clone());
        let metrics_backend = vars
            .get("DRAFTHORSE_METRICS_BACKEND")
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_else(|| "logging".into());
        let log_level = vars
            .get("DRAFTHORSE_LOG_LEVEL")
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_else(|| "info".into());

        let max_tokens: u64 = parse(vars, "DRAFTHORSE_MAX_TOKENS", 512)?;
        let temperature: f64 = parse(vars, "DRAFTHORSE_TEMPERATURE", 0.2)?;
        let concurrency: usize = parse(vars, "DRAFTHORSE_CONCURRENCY", 1)?;
        let retry_max: u32 = parse(vars, "DRAFTHORSE_RETRY_MAX", 3)?;
        let retry_backoff_base: f64 = parse(vars, "DRAFTHORSE_RETRY_BACKOFF_BASE", 1.0)?;
        let context_enabled = parse_bool(vars, "DRAFTHORSE_CONTEXT_ENABLED", false);
        let context_ttl: u64 = parse(vars, "DRAFTHORSE_CONTEXT_TTL", 900)?;
        let metrics_port: Option<u16> = match vars.get("DRAFTHORSE_METRICS_PORT") {
            Some(raw) if !raw.trim().is_empty() => {
                Some(raw.trim().parse().map_err(|e| ConfigError::Invalid {
                    name: "DRAFTHORSE_METRICS_PORT".into(),
                    reason: format!("{e}"),
                })?)
            }
            _ => None,
        };
        let poll_interval: f64 = parse(vars, "DRAFTHORSE_POLL_INTERVAL", 1.0)?;
        let stream_maxlen: u64 = parse(vars, "DRAFTHORSE_STREAM_MAXLEN", 1000)?;
        let request_timeout: f64 = parse(vars, "DRAFTHORSE_REQUEST_TIMEOUT", 60.0)?;

        let mut default_options = Map::new();
        default_options.insert("model".into(), Value::String(model.clone()));
        default_options.insert("max_tokens".into(), Value::from(max_tokens));
        default_options.insert("temperature".into(), Value::from(temperature));

        let config = Self {
            agent_id,
            redis_url,
            mailbox_stream,
            mailbox_group,
            reply_stream,
            stream_prefix,
            provider,
            api_key,
            api_base_url,
            model,
            max_tokens,
            temperature,
            concurrency,
            retry_max,
            retry_backoff_base,
            context_enabled,
            context_ttl,
            context_prefix,
            context_redis_url,
            metrics_backend,
            metrics_port,
            log_level,
            poll_interval,
            stream_maxlen,
            request_timeout,
            default_options,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency < 1 {
            return Err(ConfigError::Validation(
                "DRAFTHORSE_CONCURRENCY must be >= 1".into(),
            ));
        }
        if self.retry_max < 1 {
            return Err(ConfigError::Validation(
                "DRAFTHORSE_RETRY_MAX must be >= 1".into(),
            ));
        }
        if self.max_tokens < 1 {
            return Err(ConfigError::Validation(
                "DRAFTHORSE_MAX_TOKENS must be >= 1".into(),
            ));
        }
        if self.stream_maxlen < 1 {
            return Err(ConfigError::Validation(
                "DRAFTHORSE_STREAM_MAXLEN must be >= 1".into(),
            ));
        }
        if self.poll_interval <= 0.0 {
            return Err(ConfigError::Validation(
                "DRAFTHORSE_POLL_INTERVAL must be > 0".into(),
            ));
        }
        if self.retry_backoff_base < 0.0 {
            return Err(ConfigError::Validation(
                "DRAFTHORSE_RETRY_BACKOFF_BASE must be >= 0".into(),
            ));
        }
        if !matches!(self.metrics_backend.as_str(), "logging" | "prometheus") {
            return Err(ConfigError::Validation(
                "DRAFTHORSE_METRICS_BACKEND must be 'logging' or 'prometheus'".into(),
            ));
        }
        let scheme_ok = |url: &str| url.starts_with("redis://") || url.starts_with("rediss://");
        if !scheme_ok(&self.redis_url) {
            return Err(ConfigError::Validation(
                "DRAFTHORSE_REDIS_URL must use redis:// or rediss:// scheme".into(),
            ));
        }
        if !scheme_ok(&self.context_redis_url) {
            return Err(ConfigError::Validation(
                "DRAFTHORSE_CONTEXT_REDIS_URL must use redis:// or rediss:// scheme".into(),
            ));
        }
        Ok(())
    }

    /// Return the process default provider options combined with per-message
    /// overrides. Overrides with `null` values are ignored, not applied.
    pub fn merged_options(&self, overrides: Option<&Map<String, Value>>) -> Map<String, Value> {
        let mut merged = self.default_options.clone();
        if let Some(overrides) = overrides {
            for (key, value) in overrides {
                if !value.is_null() {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            ("DRAFTHORSE_AGENT_ID".to_string(), "agent-a".to_string()),
            (
                "DRAFTHORSE_REDIS_URL".to_string(),
                "redis://localhost:6379/0".to_string(),
            ),
            ("DRAFTHORSE_API_KEY".to_string(), "sk-test".to_string()),
        ])
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = AgentConfig::from_vars(&base_vars()).unwrap();
        assert_eq!(config.mailbox_stream, "drafthorse:mailbox:agent-a:in");
        assert_eq!(config.mailbox_group, "agent:agent-a");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.retry_max, 3);
        assert!(!config.context_enabled);
        assert_eq!(config.metrics_backend, "logging");
        assert_eq!(config.context_redis_url, config.redis_url);
    }

    #[test]
    fn missing_agent_id_rejected() {
        let mut vars = base_vars();
        vars.remove("DRAFTHORSE_AGENT_ID");
        let err = AgentConfig::from_vars(&vars).unwrap_err();
        assert!(err.to_string().contains("DRAFTHORSE_AGENT_ID"));
    }

    #[test]
    fn invalid_numeric_rejected() {
        let mut vars = base_vars();
        vars.insert("DRAFTHORSE_RETRY_MAX".into(), "three".into());
        assert!(AgentConfig::from_vars(&vars).is_err());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut vars = base_vars();
        vars.insert("DRAFTHORSE_CONCURRENCY".into(), "0".into());
        let err = AgentConfig::from_vars(&vars).unwrap_err();
        assert!(err.to_string().contains("CONCURRENCY"));
    }

    #[test]
    fn zero_backoff_accepted() {
        let mut vars = base_vars();
        vars.insert("DRAFTHORSE_RETRY_BACKOFF_BASE".into(), "0".into());
        let config = AgentConfig::from_vars(&vars).unwrap();
        assert_eq!(config.retry_backoff_base, 0.0);
    }

    #[test]
    fn bad_redis_scheme_rejected() {
        let mut vars = base_vars();
        vars.insert("DRAFTHORSE_REDIS_URL".into(), "http://localhost".into());
        assert!(AgentConfig::from_vars(&vars).is_err());
    }

    #[test]
    fn unknown_metrics_backend_rejected() {
        let mut vars = base_vars();
        vars.insert("DRAFTHORSE_METRICS_BACKEND".into(), "statsd".into());
        assert!(AgentConfig::from_vars(&vars).is_err());
    }

    #[test]
    fn merged_options_skips_null_overrides() {
        let config = AgentConfig::from_vars(&base_vars()).unwrap();
        let overrides = serde_json::json!({
            "temperature": 0.9,
            "max_tokens": null,
            "top_p": 0.5,
        });
        let merged = config.merged_options(overrides.as_object());
        assert_eq!(merged["temperature"], 0.9);
        assert_eq!(merged["max_tokens"], 512); // null override ignored
        assert_eq!(merged["top_p"], 0.5);
        assert_eq!(merged["model"], "gpt-4o-mini");
    }

    #[test]
    fn explicit_stream_names_win() {
        let mut vars = base_vars();
        vars.insert("DRAFTHORSE_MAILBOX_STREAM".into(), "custom:in".into());
        vars.insert("DRAFTHORSE_MAILBOX_GROUP".into(), "custom-group".into());
        let config = AgentConfig::from_vars(&vars).unwrap();
        assert_eq!(config.mailbox_stream, "custom:in");
        assert_eq!(config.mailbox_group, "custom-group");
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AgentConfig::from_vars(&base_vars()).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-test"));
        assert!(debug.contains("[REDACTED]"));
    }
}
