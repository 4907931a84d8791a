//! Mailbox trait — the abstraction over the durable message log.
//!
//! The transport is a consumer-group message log: each inbox entry is
//! delivered to exactly one live group member and stays in the group's
//! pending set until acknowledged, surviving consumer crashes. The agent
//! reads deliveries from `start()`, acknowledges each entry after processing,
//! and reclaims a dead sibling's pending entries through `claim_pending()`.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::MailboxError;
use crate::message::InboundMessage;

/// A message plus the log-entry handle needed to acknowledge it.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Transport-level entry id, passed to [`Mailbox::ack`]
    pub entry_id: String,

    /// The decoded message
    pub message: InboundMessage,
}

/// One batch of reclaimed pending entries.
#[derive(Debug, Clone)]
pub struct ClaimedBatch {
    /// Cursor to resume the next claim from
    pub next_cursor: String,

    /// Entries now owned by this consumer
    pub entries: Vec<Delivery>,
}

/// The core Mailbox trait.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Transport name (e.g. "redis").
    fn name(&self) -> &str;

    /// Begin consuming the inbox.
    ///
    /// Returns a receiver yielding deliveries until `stop()` is called. The
    /// implementation handles connection setup, group creation, and polling
    /// internally. Entries are NOT acknowledged on read; the consumer must
    /// call `ack` after processing (at-least-once delivery).
    async fn start(
        &self,
    ) -> std::result::Result<mpsc::Receiver<Delivery>, MailboxError>;

    /// Publish a response payload to a recipient's stream.
    ///
    /// Returns the message id assigned to the outbound entry.
    async fn send(
        &self,
        recipient: &str,
        payload: Value,
        message_type: &str,
    ) -> std::result::Result<String, MailboxError>;

    /// Acknowledge a processed entry, removing it from the pending set.
    async fn ack(&self, entry_id: &str) -> std::result::Result<(), MailboxError>;

    /// Claim up to `count` pending entries starting from `cursor`, taking
    /// ownership of entries left behind by dead consumers in the same group.
    async fn claim_pending(
        &self,
        cursor: &str,
        count: usize,
    ) -> std::result::Result<ClaimedBatch, MailboxError>;

    /// Stop consuming and release transport resources.
    async fn stop(&self) -> std::result::Result<(), MailboxError> {
        Ok(())
    }

    /// Health check — is the transport reachable?
    async fn health_check(&self) -> std::result::Result<bool, MailboxError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn delivery_carries_entry_handle() {
        let delivery = Delivery {
            entry_id: "1700000000000-0".into(),
            message: InboundMessage::new("m1", "alpha", "agent-a", Map::new()),
        };
        assert_eq!(delivery.entry_id, "1700000000000-0");
        assert_eq!(delivery.message.sender, "alpha");
    }
}
