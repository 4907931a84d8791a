//! # Drafthorse Core
//!
//! Domain types, traits, and error definitions for the Drafthorse mailbox
//! agent. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external capability is defined as a trait here: the generation
//! provider, the mailbox transport, the conversation context store, and the
//! metrics sink. Implementations live in their respective crates. This
//! enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod context;
pub mod error;
pub mod mailbox;
pub mod message;
pub mod metrics;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use context::{ContextStore, ContextTurn, ConversationContext, context_key};
pub use error::{ContextError, Error, MailboxError, Result};
pub use mailbox::{ClaimedBatch, Delivery, Mailbox};
pub use message::{InboundMessage, RESPONSE_MESSAGE_TYPE, error_envelope, success_envelope};
pub use metrics::{MetricsEvent, MetricsSink, ProcessStatus};
pub use provider::{PromptRequest, Provider, ProviderError, ProviderResponse};
