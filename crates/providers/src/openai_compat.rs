//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing an
//! OpenAI-compatible `/v1/chat/completions` surface.
//!
//! Classification contract: rate-limit, timeout, and connection-class
//! failures are retryable; authentication, bad-request, and
//! malformed-response failures are not.

use std::time::Duration;

use async_trait::async_trait;
use drafthorse_core::context::ConversationContext;
use drafthorse_core::provider::{PromptRequest, Provider, ProviderError, ProviderResponse};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// An OpenAI-compatible generation provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    default_model: String,
    default_options: Map<String, Value>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            default_model: default_model.into(),
            default_options: Map::new(),
            client,
        }
    }

    /// Set process-level default options merged under every request.
    pub fn with_default_options(mut self, options: Map<String, Value>) -> Self {
        self.default_options = options;
        self
    }

    /// Merge adapter defaults with request options; the request wins.
    fn merged_options(&self, request: &PromptRequest) -> Map<String, Value> {
        let mut merged = self.default_options.clone();
        for (key, value) in &request.options {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Map stored context turns plus the prompt into chat messages.
    fn build_messages(prompt: &str, context: Option<&ConversationContext>) -> Vec<ApiMessage> {
        let mut messages: Vec<ApiMessage> = Vec::new();
        if let Some(context) = context {
            for turn in &context.messages {
                messages.push(ApiMessage {
                    role: turn.role.clone(),
                    content: turn.content.clone(),
                });
            }
        }
        messages.push(ApiMessage {
            role: "user".into(),
            content: prompt.to_string(),
        });
        messages
    }

    /// Build the request body, resolving the model the backend expects.
    fn build_body(&self, request: &PromptRequest) -> (String, Value) {
        let mut options = self.merged_options(request);
        let model = options
            .remove("model")
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "messages": Self::build_messages(&request.prompt, request.context.as_ref()),
            "stream": false,
        });

        if let Some(temperature) = options.get("temperature").and_then(Value::as_f64) {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = options.get("max_tokens").and_then(Value::as_u64) {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(stop) = options.get("stop") {
            if !stop.is_null() {
                body["stop"] = stop.clone();
            }
        }

        (model, body)
    }

    fn classify_send_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::new("timeout", e.to_string(), true)
        } else if e.is_connect() {
            ProviderError::new("connection_error", e.to_string(), true)
        } else {
            ProviderError::new("network_error", e.to_string(), true)
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        request: &PromptRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let (model, body) = self.build_body(request);

        debug!(provider = %self.name, model = %model, "Sending completion request");

        let mut http_request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body);

        // Per-message timeout override, when a producer supplies one
        if let Some(timeout) = request.options.get("timeout").and_then(Value::as_f64) {
            if timeout > 0.0 {
                http_request = http_request.timeout(Duration::from_secs_f64(timeout));
            }
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| self.classify_send_error(e))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(
                ProviderError::new("rate_limited", "Rate limited by provider", true)
                    .with_detail("status_code", status),
            );
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::new(
                "authentication_failed",
                "Invalid API key or insufficient permissions",
                false,
            )
            .with_detail("status_code", status));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::new("api_error", error_body, false)
                .with_detail("status_code", status));
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            ProviderError::new(
                "malformed_response",
                format!("Failed to parse response: {e}"),
                false,
            )
        })?;

        let choice = api_response.choices.into_iter().next().ok_or_else(|| {
            ProviderError::new("malformed_response", "No choices in response", false)
        })?;

        let mut usage = Map::new();
        if let Some(u) = api_response.usage {
            usage.insert("prompt_tokens".into(), Value::from(u.prompt_tokens));
            usage.insert("completion_tokens".into(), Value::from(u.completion_tokens));
            usage.insert("total_tokens".into(), Value::from(u.total_tokens));
        }

        Ok(ProviderResponse {
            content: choice.message.content.unwrap_or_default(),
            model: api_response.model,
            request_id: api_response.id,
            usage,
            provider: self.name.clone(),
        })
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    id: String,
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use drafthorse_core::context::ContextTurn;

    fn test_provider() -> OpenAiCompatProvider {
        let mut defaults = Map::new();
        defaults.insert("model".into(), Value::String("gpt-4o-mini".into()));
        defaults.insert("max_tokens".into(), Value::from(512u64));
        defaults.insert("temperature".into(), Value::from(0.2));
        OpenAiCompatProvider::new(
            "openai",
            "https://api.openai.com/v1/",
            "sk-test",
            "gpt-4o-mini",
            Duration::from_secs(60),
        )
        .with_default_options(defaults)
    }

    fn request_with_options(options: Value) -> PromptRequest {
        PromptRequest {
            prompt: "Explain X".into(),
            options: options.as_object().cloned().unwrap_or_default(),
            metadata: Map::new(),
            context: None,
            thread_id: None,
            sender: None,
            message_id: None,
        }
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let provider = test_provider();
        assert_eq!(provider.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn request_options_override_defaults() {
        let provider = test_provider();
        let request = request_with_options(serde_json::json!({
            "model": "gpt-4o",
            "temperature": 0.9,
        }));
        let (model, body) = provider.build_body(&request);
        assert_eq!(model, "gpt-4o");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["temperature"], 0.9);
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn default_model_used_when_option_absent() {
        let provider = test_provider();
        let request = request_with_options(serde_json::json!({}));
        let (model, _) = provider.build_body(&request);
        assert_eq!(model, "gpt-4o-mini");
    }

    #[test]
    fn context_turns_precede_prompt() {
        let context = ConversationContext {
            messages: vec![
                ContextTurn::user("earlier question"),
                ContextTurn::assistant("earlier answer"),
            ],
        };
        let messages = OpenAiCompatProvider::build_messages("follow-up", Some(&context));
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].content, "earlier question");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[2].content, "follow-up");
    }

    #[test]
    fn no_context_yields_single_user_message() {
        let messages = OpenAiCompatProvider::build_messages("hello", None);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn parse_completion_response() {
        let data = r#"{
            "id": "chatcmpl-123",
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "answer"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.id, "chatcmpl-123");
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("answer")
        );
        assert_eq!(parsed.usage.as_ref().unwrap().total_tokens, 15);
    }

    #[test]
    fn parse_response_without_usage() {
        let data = r#"{
            "id": "chatcmpl-456",
            "model": "local",
            "choices": [{"message": {"content": null}}]
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        assert!(parsed.usage.is_none());
        assert!(parsed.choices[0].message.content.is_none());
    }
}
