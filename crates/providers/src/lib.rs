//! Generation provider implementations for Drafthorse.
//!
//! All providers implement the `drafthorse_core::Provider` trait.
//! `create_provider` selects the concrete adapter from configuration.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use std::sync::Arc;
use std::time::Duration;

use drafthorse_config::{AgentConfig, ConfigError};
use drafthorse_core::Provider;

/// Instantiate the provider adapter specified in configuration.
pub fn create_provider(config: &AgentConfig) -> Result<Arc<dyn Provider>, ConfigError> {
    let base_url = match (config.api_base_url.as_deref(), config.provider.as_str()) {
        (Some(url), _) => url.to_string(),
        (None, "openai") => "https://api.openai.com/v1".to_string(),
        (None, "openrouter") => "https://openrouter.ai/api/v1".to_string(),
        (None, other) => {
            return Err(ConfigError::Validation(format!(
                "Unsupported provider '{other}' (set DRAFTHORSE_API_BASE_URL for a custom \
                 OpenAI-compatible endpoint)"
            )));
        }
    };

    let provider = OpenAiCompatProvider::new(
        &config.provider,
        base_url,
        &config.api_key,
        &config.model,
        Duration::from_secs_f64(config.request_timeout),
    )
    .with_default_options(config.default_options.clone());

    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_for(provider: &str, base_url: Option<&str>) -> AgentConfig {
        let mut vars = HashMap::from([
            ("DRAFTHORSE_AGENT_ID".to_string(), "agent-a".to_string()),
            (
                "DRAFTHORSE_REDIS_URL".to_string(),
                "redis://localhost:6379".to_string(),
            ),
            ("DRAFTHORSE_API_KEY".to_string(), "sk-test".to_string()),
            ("DRAFTHORSE_PROVIDER".to_string(), provider.to_string()),
        ]);
        if let Some(url) = base_url {
            vars.insert("DRAFTHORSE_API_BASE_URL".to_string(), url.to_string());
        }
        AgentConfig::from_vars(&vars).unwrap()
    }

    #[test]
    fn openai_provider_from_config() {
        let provider = create_provider(&config_for("openai", None)).unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn custom_endpoint_requires_base_url() {
        assert!(create_provider(&config_for("vllm", None)).is_err());
        let provider =
            create_provider(&config_for("vllm", Some("http://localhost:8000/v1"))).unwrap();
        assert_eq!(provider.name(), "vllm");
    }
}
