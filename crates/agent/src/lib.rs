//! The Drafthorse agent — prompt pipeline, recovery sweep, and runtime.
//!
//! One inbound mailbox message becomes exactly one terminal outcome:
//!
//! 1. **Admit** under the concurrency bound (permit held through retries
//!    and backoff)
//! 2. **Validate** the payload into a typed prompt request
//! 3. **Resolve** prior conversation context, if enabled
//! 4. **Invoke** the provider under the bounded-retry policy
//! 5. **Publish** one success or error envelope, record one metrics event,
//!    and append the exchange to stored context on success
//!
//! On startup the recovery sweep reclaims entries left pending by a crashed
//! instance and replays them through the same pipeline. Delivery is
//! at-least-once: acknowledgment follows processing, so a crash between
//! response send and ack yields a duplicate response on the next startup.

pub mod handler;
pub mod recovery;
pub mod runtime;

pub use handler::PromptHandler;
pub use recovery::recover_pending;
pub use runtime::{AgentRuntime, perform_healthcheck};
