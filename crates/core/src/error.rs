//! Error types for the Drafthorse domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

use crate::provider::ProviderError;

/// The top-level error type for all Drafthorse operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Mailbox transport errors ---
    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    // --- Context store errors ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Stream or consumer group missing: {0}")]
    GroupMissing(String),

    #[error("Delivery failed to {recipient}: {reason}")]
    DeliveryFailed { recipient: String, reason: String },

    #[error("Transport command failed: {0}")]
    Command(String),
}

impl MailboxError {
    /// Whether this error means the stream/group simply does not exist yet
    /// (fresh deployment) as opposed to a genuine transport failure.
    pub fn is_group_missing(&self) -> bool {
        matches!(self, Self::GroupMissing(_))
    }
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Stored context is not valid JSON: {0}")]
    Corrupt(String),
}
