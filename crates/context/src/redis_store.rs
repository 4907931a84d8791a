//! Redis-backed context store for persistent conversation history.
//!
//! Values are stored as JSON strings under `{prefix}:{key}`. A positive TTL
//! becomes a SET EX (sliding expiry, refreshed on every write); a TTL of zero
//! persists without expiry.

use async_trait::async_trait;
use drafthorse_core::context::{ContextStore, ConversationContext};
use drafthorse_core::error::ContextError;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;

/// A context store backed by a Redis key/value namespace.
pub struct RedisContextStore {
    client: redis::Client,
    prefix: String,
    conn: OnceCell<ConnectionManager>,
}

impl RedisContextStore {
    /// Create a store for the given connection URL and key prefix.
    ///
    /// The connection is established lazily on first use.
    pub fn new(url: &str, prefix: &str) -> Result<Self, ContextError> {
        let client =
            redis::Client::open(url).map_err(|e| ContextError::Storage(e.to_string()))?;
        Ok(Self {
            client,
            prefix: prefix.trim_end_matches(':').to_string(),
            conn: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, ContextError> {
        let manager = self
            .conn
            .get_or_try_init(|| async { ConnectionManager::new(self.client.clone()).await })
            .await
            .map_err(|e| ContextError::Storage(e.to_string()))?;
        Ok(manager.clone())
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}:{key}", self.prefix)
    }
}

#[async_trait]
impl ContextStore for RedisContextStore {
    fn name(&self) -> &str { "redis" }

    async fn get(&self, key: &str) -> Result<Option<ConversationContext>, ContextError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(self.storage_key(key))
            .await
            .map_err(|e| ContextError::Storage(e.to_string()))?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| ContextError::Corrupt(e.to_string())),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &ConversationContext,
        ttl_secs: u64,
    ) -> Result<(), ContextError> {
        let mut conn = self.connection().await?;
        let json =
            serde_json::to_string(value).map_err(|e| ContextError::Storage(e.to_string()))?;
        let storage_key = self.storage_key(key);
        if ttl_secs > 0 {
            let _: () = conn
                .set_ex(storage_key, json, ttl_secs)
                .await
                .map_err(|e| ContextError::Storage(e.to_string()))?;
        } else {
            let _: () = conn
                .set(storage_key, json)
                .await
                .map_err(|e| ContextError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), ContextError> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .del(self.storage_key(key))
            .await
            .map_err(|e| ContextError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_trailing_colon_trimmed() {
        let store = RedisContextStore::new("redis://localhost:6379", "drafthorse:context:")
            .unwrap();
        assert_eq!(store.storage_key("agent-a:t1"), "drafthorse:context:agent-a:t1");
    }

    #[test]
    fn invalid_url_rejected() {
        assert!(RedisContextStore::new("not-a-url", "prefix").is_err());
    }
}
