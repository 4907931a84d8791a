//! Redis Streams mailbox adapter.
//!
//! Consumes the agent's inbox stream through a consumer group (XREADGROUP
//! with a blocking window), publishes response envelopes with approximate
//! MAXLEN trimming (XADD), and exposes the pending-set primitives the
//! recovery sweep needs (XAUTOCLAIM / XACK).
//!
//! Entries are never acknowledged on read; the consumer acks after
//! processing, which is what makes delivery at-least-once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use drafthorse_config::AgentConfig;
use drafthorse_core::error::MailboxError;
use drafthorse_core::mailbox::{ClaimedBatch, Delivery, Mailbox};
use drafthorse_core::message::InboundMessage;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamMaxlen, StreamReadOptions,
    StreamReadReply,
};
use serde_json::{Map, Value};
use tokio::sync::{OnceCell, mpsc};
use tracing::{debug, info, warn};

/// Entries fetched per blocking read.
const READ_BATCH: usize = 10;

/// Capacity of the delivery channel between the read loop and the runtime.
const DELIVERY_BUFFER: usize = 64;

/// Transport-level settings for the Redis mailbox.
#[derive(Clone)]
pub struct MailboxSettings {
    /// Consumer identity within the group
    pub agent_id: String,
    pub url: String,
    /// Inbox stream to consume
    pub stream: String,
    /// Consumer group name
    pub group: String,
    /// Fixed outbound stream; per-recipient naming when unset
    pub reply_stream: Option<String>,
    /// Prefix for per-recipient outbound streams
    pub stream_prefix: String,
    /// Approximate trim length for outbound streams
    pub maxlen: u64,
    /// Blocking-read window
    pub poll_interval: Duration,
}

impl std::fmt::Debug for MailboxSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxSettings")
            .field("agent_id", &self.agent_id)
            .field("url", &"[REDACTED]")
            .field("stream", &self.stream)
            .field("group", &self.group)
            .field("reply_stream", &self.reply_stream)
            .field("stream_prefix", &self.stream_prefix)
            .field("maxlen", &self.maxlen)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl MailboxSettings {
    /// Derive transport settings from agent configuration.
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            agent_id: config.agent_id.clone(),
            url: config.redis_url.clone(),
            stream: config.mailbox_stream.clone(),
            group: config.mailbox_group.clone(),
            reply_stream: config.reply_stream.clone(),
            stream_prefix: config.stream_prefix.clone(),
            maxlen: config.stream_maxlen,
            poll_interval: Duration::from_secs_f64(config.poll_interval),
        }
    }
}

/// Redis Streams mailbox.
pub struct RedisMailbox {
    settings: MailboxSettings,
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    running: Arc<AtomicBool>,
}

impl RedisMailbox {
    /// Create a mailbox for the given settings.
    ///
    /// The connection is established lazily on `start()` / first use.
    pub fn new(settings: MailboxSettings) -> Result<Self, MailboxError> {
        let client = redis::Client::open(settings.url.as_str())
            .map_err(|e| MailboxError::Connection(e.to_string()))?;
        Ok(Self {
            settings,
            client,
            conn: OnceCell::new(),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Create a mailbox directly from agent configuration.
    pub fn from_config(config: &AgentConfig) -> Result<Self, MailboxError> {
        Self::new(MailboxSettings::from_config(config))
    }

    async fn connection(&self) -> Result<ConnectionManager, MailboxError> {
        let manager = self
            .conn
            .get_or_try_init(|| async { ConnectionManager::new(self.client.clone()).await })
            .await
            .map_err(|e| MailboxError::Connection(e.to_string()))?;
        Ok(manager.clone())
    }

    /// Create the consumer group, tolerating one that already exists.
    async fn ensure_group(&self, conn: &mut ConnectionManager) -> Result<(), MailboxError> {
        match conn
            .xgroup_create_mkstream::<_, _, _, String>(
                &self.settings.stream,
                &self.settings.group,
                "$",
            )
            .await
        {
            Ok(_) => {
                info!(
                    stream = %self.settings.stream,
                    group = %self.settings.group,
                    "Created consumer group"
                );
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(MailboxError::Connection(e.to_string())),
        }
    }

    /// Resolve the outbound stream for a recipient.
    fn outbound_stream(&self, recipient: &str) -> String {
        match &self.settings.reply_stream {
            Some(stream) => stream.clone(),
            None => format!("{}:{recipient}:in", self.settings.stream_prefix),
        }
    }

    fn classify(e: redis::RedisError) -> MailboxError {
        let text = e.to_string();
        if e.code() == Some("NOGROUP") || text.contains("no such key") {
            MailboxError::GroupMissing(text)
        } else {
            MailboxError::Command(text)
        }
    }
}

/// Decode one stream entry into a delivery.
///
/// A malformed or absent payload field decodes to an empty map rather than
/// dropping the entry, so the pipeline still produces its one terminal
/// outcome (an `invalid_payload` response) for replayed garbage.
fn decode_entry(entry: &StreamId) -> Delivery {
    let payload: Map<String, Value> = entry
        .get::<String>("payload")
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .and_then(|value| value.as_object().cloned())
        .unwrap_or_default();

    let message = InboundMessage::new(
        entry
            .get::<String>("message_id")
            .unwrap_or_else(|| entry.id.clone()),
        entry.get::<String>("sender").unwrap_or_default(),
        entry.get::<String>("recipient").unwrap_or_default(),
        payload,
    );

    Delivery {
        entry_id: entry.id.clone(),
        message,
    }
}

async fn read_loop(
    mut conn: ConnectionManager,
    stream: String,
    group: String,
    consumer: String,
    block: Duration,
    running: Arc<AtomicBool>,
    tx: mpsc::Sender<Delivery>,
) {
    let options = StreamReadOptions::default()
        .group(&group, &consumer)
        .count(READ_BATCH)
        .block(block.as_millis() as usize);

    while running.load(Ordering::SeqCst) {
        let reply: Result<Option<StreamReadReply>, _> =
            conn.xread_options(&[&stream], &[">"], &options).await;

        match reply {
            Ok(Some(reply)) => {
                for key in reply.keys {
                    for entry in key.ids {
                        debug!(entry_id = %entry.id, stream = %stream, "Inbox entry received");
                        if tx.send(decode_entry(&entry)).await.is_err() {
                            return; // receiver dropped, consumer is gone
                        }
                    }
                }
            }
            // Blocking window elapsed with nothing to read
            Ok(None) => {}
            Err(e) => {
                if !running.load(Ordering::SeqCst) {
                    return;
                }
                warn!(error = %e, stream = %stream, "Inbox read failed, backing off");
                tokio::time::sleep(block).await;
            }
        }
    }
}

#[async_trait]
impl Mailbox for RedisMailbox {
    fn name(&self) -> &str {
        "redis"
    }

    async fn start(&self) -> Result<mpsc::Receiver<Delivery>, MailboxError> {
        let mut conn = self.connection().await?;
        self.ensure_group(&mut conn).await?;

        let (tx, rx) = mpsc::channel(DELIVERY_BUFFER);
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(read_loop(
            conn,
            self.settings.stream.clone(),
            self.settings.group.clone(),
            self.settings.agent_id.clone(),
            self.settings.poll_interval,
            self.running.clone(),
            tx,
        ));

        info!(
            stream = %self.settings.stream,
            group = %self.settings.group,
            consumer = %self.settings.agent_id,
            "Mailbox consumption started"
        );
        Ok(rx)
    }

    async fn send(
        &self,
        recipient: &str,
        payload: Value,
        message_type: &str,
    ) -> Result<String, MailboxError> {
        let mut conn = self.connection().await?;
        let stream = self.outbound_stream(recipient);
        let message_id = uuid::Uuid::new_v4().to_string();
        let payload_json = payload.to_string();

        let fields: [(&str, String); 6] = [
            ("message_id", message_id.clone()),
            ("sender", self.settings.agent_id.clone()),
            ("recipient", recipient.to_string()),
            ("message_type", message_type.to_string()),
            ("payload", payload_json),
            ("timestamp", chrono::Utc::now().to_rfc3339()),
        ];

        let _: String = conn
            .xadd_maxlen(
                &stream,
                StreamMaxlen::Approx(self.settings.maxlen as usize),
                "*",
                &fields,
            )
            .await
            .map_err(|e| MailboxError::DeliveryFailed {
                recipient: recipient.to_string(),
                reason: e.to_string(),
            })?;

        debug!(recipient = %recipient, stream = %stream, message_id = %message_id, "Response published");
        Ok(message_id)
    }

    async fn ack(&self, entry_id: &str) -> Result<(), MailboxError> {
        let mut conn = self.connection().await?;
        let _: i64 = conn
            .xack(&self.settings.stream, &self.settings.group, &[entry_id])
            .await
            .map_err(Self::classify)?;
        Ok(())
    }

    async fn claim_pending(
        &self,
        cursor: &str,
        count: usize,
    ) -> Result<ClaimedBatch, MailboxError> {
        let mut conn = self.connection().await?;
        let options = StreamAutoClaimOptions::default().count(count);
        let reply: StreamAutoClaimReply = conn
            .xautoclaim_options(
                &self.settings.stream,
                &self.settings.group,
                &self.settings.agent_id,
                0,
                cursor,
                options,
            )
            .await
            .map_err(Self::classify)?;

        Ok(ClaimedBatch {
            next_cursor: reply.next_stream_id,
            entries: reply.claimed.iter().map(decode_entry).collect(),
        })
    }

    async fn stop(&self) -> Result<(), MailboxError> {
        self.running.store(false, Ordering::SeqCst);
        info!(stream = %self.settings.stream, "Mailbox consumption stopped");
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, MailboxError> {
        let mut conn = self.connection().await?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| MailboxError::Connection(e.to_string()))?;
        Ok(pong == "PONG")
    }
}
