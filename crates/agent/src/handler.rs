//! The prompt processing pipeline.
//!
//! `handle` never raises outward: every failure is converted into an error
//! envelope plus a metrics event. The admission permit is acquired before any
//! work and held until the terminal outcome, backoff delays included, so the
//! bound caps load on the generation backend rather than just simultaneous
//! network calls.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use drafthorse_config::AgentConfig;
use drafthorse_core::context::{ContextStore, ConversationContext, context_key};
use drafthorse_core::error::Result;
use drafthorse_core::mailbox::Mailbox;
use drafthorse_core::message::{
    InboundMessage, RESPONSE_MESSAGE_TYPE, error_envelope, success_envelope,
};
use drafthorse_core::metrics::{MetricsEvent, MetricsSink, ProcessStatus};
use drafthorse_core::provider::{PromptRequest, Provider, ProviderError, ProviderResponse};
use futures::FutureExt;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// Coordinates prompt validation, provider invocation, and response emission.
pub struct PromptHandler {
    config: Arc<AgentConfig>,
    provider: Arc<dyn Provider>,
    mailbox: Arc<dyn Mailbox>,
    context_store: Arc<dyn ContextStore>,
    metrics: Arc<dyn MetricsSink>,
    semaphore: Arc<Semaphore>,
}

impl PromptHandler {
    pub fn new(
        config: Arc<AgentConfig>,
        provider: Arc<dyn Provider>,
        mailbox: Arc<dyn Mailbox>,
        context_store: Arc<dyn ContextStore>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.concurrency));
        Self {
            config,
            provider,
            mailbox,
            context_store,
            metrics,
            semaphore,
        }
    }

    /// Entry point used by the runtime dispatch loop and the recovery sweep.
    pub async fn handle(&self, message: &InboundMessage) {
        // The permit is held for the entire remainder of processing,
        // including retry backoff delays. Dropping the future releases it
        // without emitting a response or metrics.
        let Ok(_permit) = self.semaphore.acquire().await else {
            return; // the semaphore is never closed
        };
        if let Err(e) = self.process(message).await {
            error!(
                message_id = %message.message_id,
                error = %e,
                "Failed to process mailbox message"
            );
        }
    }

    async fn process(&self, message: &InboundMessage) -> Result<()> {
        let started = Instant::now();
        let payload = &message.payload;

        let metadata: Map<String, Value> = payload
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        // Validate: the prompt must be a non-empty string. Nothing reaches
        // the provider otherwise.
        let prompt = payload
            .get("prompt")
            .and_then(Value::as_str)
            .filter(|p| !p.trim().is_empty());
        let Some(prompt) = prompt else {
            let invalid =
                ProviderError::invalid_payload("Payload must include non-empty 'prompt' field");
            self.send_error(message, &invalid, &metadata).await?;
            self.record(message, ProcessStatus::Error, None, started, 0, &invalid);
            return Ok(());
        };

        // Normalize
        let options = payload.get("options").and_then(Value::as_object);
        let merged_options = self.config.merged_options(options);
        let thread_id = payload
            .get("thread_id")
            .and_then(Value::as_str)
            .map(String::from);
        let reply_to = payload
            .get("reply_to")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(&message.sender)
            .to_string();

        // Context resolution: an explicit payload context is overridden by a
        // successfully fetched stored context.
        let mut context: Option<ConversationContext> = payload
            .get("context")
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        if self.config.context_enabled {
            if let Some(thread_id) = &thread_id {
                let key = context_key(&self.config.agent_id, thread_id);
                match self.context_store.get(&key).await {
                    Ok(Some(stored)) => context = Some(stored),
                    Ok(None) => {}
                    Err(e) => warn!(
                        key = %key,
                        error = %e,
                        "Context fetch failed, proceeding without stored context"
                    ),
                }
            }
        }

        let request = PromptRequest {
            prompt: prompt.to_string(),
            options: merged_options,
            metadata: metadata.clone(),
            context: context.clone(),
            thread_id: thread_id.clone(),
            sender: Some(message.sender.clone()),
            message_id: Some(message.message_id.clone()),
        };

        let (outcome, attempts) = self.invoke_with_retry(&request, message).await;

        let response = match outcome {
            Ok(response) => response,
            Err(terminal) => {
                self.send_error(message, &terminal, &metadata).await?;
                self.record(message, ProcessStatus::Error, None, started, attempts, &terminal);
                return Ok(());
            }
        };

        let envelope = success_envelope(message, &response, thread_id.as_deref(), &metadata);
        self.mailbox
            .send(&reply_to, envelope, RESPONSE_MESSAGE_TYPE)
            .await?;
        self.metrics.record(&MetricsEvent {
            agent_id: self.config.agent_id.clone(),
            message_id: message.message_id.clone(),
            sender: message.sender.clone(),
            status: ProcessStatus::Success,
            provider: Some(response.provider.clone()),
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            attempts,
            retryable: None,
            error_code: None,
        });

        if self.config.context_enabled {
            if let Some(thread_id) = &thread_id {
                self.update_context(thread_id, context, prompt, &response.content)
                    .await;
            }
        }

        Ok(())
    }

    /// Invoke the provider under the bounded-retry policy.
    ///
    /// Returns the terminal outcome and the number of attempts made. A panic
    /// inside the adapter is caught and converted into a non-retryable
    /// `unhandled_error`, regardless of remaining budget.
    async fn invoke_with_retry(
        &self,
        request: &PromptRequest,
        message: &InboundMessage,
    ) -> (std::result::Result<ProviderResponse, ProviderError>, u32) {
        let mut attempt: u32 = 1;
        loop {
            debug!(message_id = %message.message_id, attempt, "Invoking provider");
            let result = AssertUnwindSafe(self.provider.generate(request))
                .catch_unwind()
                .await;
            match result {
                Ok(Ok(response)) => return (Ok(response), attempt),
                Ok(Err(provider_error)) => {
                    warn!(
                        message_id = %message.message_id,
                        code = %provider_error.code,
                        retryable = provider_error.retryable,
                        attempt,
                        retry_max = self.config.retry_max,
                        "Provider error"
                    );
                    if !provider_error.retryable || attempt >= self.config.retry_max {
                        return (Err(provider_error), attempt);
                    }
                    let delay = backoff_delay(self.config.retry_backoff_base, attempt);
                    if delay > 0.0 {
                        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                    }
                    attempt += 1;
                }
                Err(panic) => {
                    let text = panic_text(panic);
                    error!(
                        message_id = %message.message_id,
                        panic = %text,
                        "Provider panicked"
                    );
                    return (
                        Err(ProviderError::unhandled("Unexpected provider failure")
                            .with_detail("panic", text)),
                        attempt,
                    );
                }
            }
        }
    }

    /// Failures are never redirected: error envelopes go to the original
    /// sender.
    async fn send_error(
        &self,
        message: &InboundMessage,
        terminal: &ProviderError,
        metadata: &Map<String, Value>,
    ) -> Result<()> {
        let envelope = error_envelope(message, terminal, metadata);
        self.mailbox
            .send(&message.sender, envelope, RESPONSE_MESSAGE_TYPE)
            .await?;
        Ok(())
    }

    fn record(
        &self,
        message: &InboundMessage,
        status: ProcessStatus,
        provider: Option<&str>,
        started: Instant,
        attempts: u32,
        terminal: &ProviderError,
    ) {
        self.metrics.record(&MetricsEvent {
            agent_id: self.config.agent_id.clone(),
            message_id: message.message_id.clone(),
            sender: message.sender.clone(),
            status,
            provider: provider.map(String::from),
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            attempts,
            retryable: Some(terminal.retryable),
            error_code: Some(terminal.code.clone()),
        });
    }

    /// Append the completed exchange to stored context. Uses the context
    /// resolved earlier in the same call: at most one read and one write per
    /// successful message.
    async fn update_context(
        &self,
        thread_id: &str,
        context: Option<ConversationContext>,
        prompt: &str,
        response_text: &str,
    ) {
        let key = context_key(&self.config.agent_id, thread_id);
        let mut context = context.unwrap_or_default();
        context.push_exchange(prompt, response_text);
        if let Err(e) = self
            .context_store
            .set(&key, &context, self.config.context_ttl)
            .await
        {
            warn!(key = %key, error = %e, "Context update failed");
        }
    }
}

/// Exponential backoff: `base * 2^(attempt-1)` seconds.
fn backoff_delay(base: f64, attempt: u32) -> f64 {
    base * 2f64.powi(attempt as i32 - 1)
}

fn panic_text(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
