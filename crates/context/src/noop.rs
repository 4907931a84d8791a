//! No-op context store — used when the context feature is disabled.

use async_trait::async_trait;
use drafthorse_core::context::{ContextStore, ConversationContext};
use drafthorse_core::error::ContextError;

/// A context store that stores nothing.
pub struct NullContextStore;

#[async_trait]
impl ContextStore for NullContextStore {
    fn name(&self) -> &str { "none" }

    async fn get(&self, _key: &str) -> Result<Option<ConversationContext>, ContextError> {
        Ok(None)
    }

    async fn set(
        &self,
        _key: &str,
        _value: &ConversationContext,
        _ttl_secs: u64,
    ) -> Result<(), ContextError> {
        Ok(())
    }

    async fn clear(&self, _key: &str) -> Result<(), ContextError> {
        Ok(())
    }
}
