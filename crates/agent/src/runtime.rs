//! Runtime orchestration: wiring, lifecycle, and the dispatch loop.

use std::sync::Arc;

use drafthorse_config::AgentConfig;
use drafthorse_context::{NullContextStore, RedisContextStore};
use drafthorse_core::context::ContextStore;
use drafthorse_core::error::{Error, Result};
use drafthorse_core::mailbox::Mailbox;
use drafthorse_core::metrics::MetricsSink;
use drafthorse_core::provider::Provider;
use drafthorse_mailbox::RedisMailbox;
use drafthorse_providers::create_provider;
use drafthorse_telemetry::{LoggingMetricsSink, PrometheusMetricsSink};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::handler::PromptHandler;
use crate::recovery::recover_pending;

/// Owns the agent lifecycle: start, steady-state dispatch, orderly stop.
pub struct AgentRuntime {
    config: Arc<AgentConfig>,
    mailbox: Arc<dyn Mailbox>,
    provider: Arc<dyn Provider>,
    handler: Arc<PromptHandler>,
    shutdown: CancellationToken,
}

impl AgentRuntime {
    /// Build the full production wiring from configuration.
    pub fn from_config(config: AgentConfig) -> Result<Self> {
        let config = Arc::new(config);

        let mailbox: Arc<dyn Mailbox> = Arc::new(RedisMailbox::from_config(&config)?);

        let provider = create_provider(&config).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;

        let context_store: Arc<dyn ContextStore> = if config.context_enabled {
            Arc::new(RedisContextStore::new(
                &config.context_redis_url,
                &config.context_prefix,
            )?)
        } else {
            Arc::new(NullContextStore)
        };

        let metrics: Arc<dyn MetricsSink> = match config.metrics_backend.as_str() {
            "prometheus" => {
                let sink =
                    PrometheusMetricsSink::new().map_err(|e| Error::Internal(e.to_string()))?;
                if let Some(port) = config.metrics_port {
                    sink.spawn_exporter(port);
                }
                Arc::new(sink)
            }
            _ => Arc::new(LoggingMetricsSink),
        };

        Ok(Self::new(config, mailbox, provider, context_store, metrics))
    }

    /// Assemble a runtime from explicit parts (testing hook).
    pub fn new(
        config: Arc<AgentConfig>,
        mailbox: Arc<dyn Mailbox>,
        provider: Arc<dyn Provider>,
        context_store: Arc<dyn ContextStore>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let handler = Arc::new(PromptHandler::new(
            config.clone(),
            provider.clone(),
            mailbox.clone(),
            context_store,
            metrics,
        ));
        Self {
            config,
            mailbox,
            provider,
            handler,
            shutdown: CancellationToken::new(),
        }
    }

    /// Signal the dispatch loop to exit. In-flight processing runs to
    /// completion.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// A token observers can use to request or await shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until shutdown is requested.
    ///
    /// The recovery sweep runs concurrently with live intake; recovered and
    /// newly-arrived messages share the same admission pool.
    pub async fn run(&self) -> Result<()> {
        let mut deliveries = self.mailbox.start().await?;
        info!(agent_id = %self.config.agent_id, "Agent runtime started");

        let recovery = tokio::spawn(recover_pending(
            self.mailbox.clone(),
            self.handler.clone(),
            self.config.agent_id.clone(),
        ));

        let mut inflight = JoinSet::new();
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                maybe = deliveries.recv() => match maybe {
                    Some(delivery) => {
                        let handler = self.handler.clone();
                        let mailbox = self.mailbox.clone();
                        inflight.spawn(async move {
                            handler.handle(&delivery.message).await;
                            if let Err(e) = mailbox.ack(&delivery.entry_id).await {
                                warn!(
                                    entry_id = %delivery.entry_id,
                                    error = %e,
                                    "Failed to acknowledge processed entry"
                                );
                            }
                        });
                    }
                    None => break,
                },
                Some(_) = inflight.join_next(), if !inflight.is_empty() => {}
            }
        }

        // No new admissions past this point; drain in-flight work.
        info!(agent_id = %self.config.agent_id, "Shutdown requested, draining in-flight work");
        while inflight.join_next().await.is_some() {}
        let _ = recovery.await;

        self.stop().await;
        Ok(())
    }

    /// Release transport and provider resources.
    async fn stop(&self) {
        if let Err(e) = self.mailbox.stop().await {
            warn!(error = %e, "Mailbox stop failed");
        }
        if let Err(e) = self.provider.close().await {
            debug!(error = %e, "Provider cleanup failed");
        }
        info!(agent_id = %self.config.agent_id, "Agent runtime stopped");
    }
}

/// Attempt to reach the mailbox transport.
pub async fn perform_healthcheck(config: &AgentConfig) -> bool {
    let mailbox = match RedisMailbox::from_config(config) {
        Ok(mailbox) => mailbox,
        Err(e) => {
            warn!(agent_id = %config.agent_id, error = %e, "Healthcheck failed");
            return false;
        }
    };
    match mailbox.health_check().await {
        Ok(true) => {
            info!(agent_id = %config.agent_id, "Healthcheck succeeded");
            true
        }
        Ok(false) => {
            warn!(agent_id = %config.agent_id, "Healthcheck failed: unexpected ping reply");
            false
        }
        Err(e) => {
            warn!(agent_id = %config.agent_id, error = %e, "Healthcheck failed");
            false
        }
    }
}
