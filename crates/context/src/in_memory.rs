//! In-memory context store — useful for testing and single-process runs.
//!
//! TTL is accepted but not enforced; entries live until cleared.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use drafthorse_core::context::{ContextStore, ConversationContext};
use drafthorse_core::error::ContextError;
use tokio::sync::RwLock;

/// A context store backed by a shared in-memory map.
pub struct InMemoryContextStore {
    entries: Arc<RwLock<HashMap<String, ConversationContext>>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryContextStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    fn name(&self) -> &str { "in_memory" }

    async fn get(&self, key: &str) -> Result<Option<ConversationContext>, ContextError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(
        &self,
        key: &str,
        value: &ConversationContext,
        _ttl_secs: u64,
    ) -> Result<(), ContextError> {
        self.entries.write().await.insert(key.into(), value.clone());
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), ContextError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_get_roundtrip() {
        let store = InMemoryContextStore::new();
        let mut ctx = ConversationContext::default();
        ctx.push_exchange("hi", "hello");

        store.set("agent-a:t1", &ctx, 900).await.unwrap();
        let fetched = store.get("agent-a:t1").await.unwrap();
        assert_eq!(fetched, Some(ctx));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let store = InMemoryContextStore::new();
        assert!(store.get("agent-a:absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_removes_entry() {
        let store = InMemoryContextStore::new();
        let ctx = ConversationContext::default();
        store.set("agent-a:t1", &ctx, 0).await.unwrap();
        store.clear("agent-a:t1").await.unwrap();
        assert!(store.get("agent-a:t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_lose_entries() {
        let store = Arc::new(InMemoryContextStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut ctx = ConversationContext::default();
                ctx.push_exchange(format!("q{i}"), format!("a{i}"));
                store.set(&format!("agent-a:t{i}"), &ctx, 900).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        for i in 0..16 {
            assert!(store.get(&format!("agent-a:t{i}")).await.unwrap().is_some());
        }
    }
}
