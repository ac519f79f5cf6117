use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Disposable key-value layer holding rollup snapshots.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    /// Replaces `key` with `value`, expiring after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

#[derive(Clone)]
pub struct RedisSnapshotCache {
    conn: ConnectionManager,
}

impl RedisSnapshotCache {
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SnapshotCache for RedisSnapshotCache {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        // SETEX rejects a zero expiry.
        let seconds = ttl.as_secs().max(1);
        let mut conn = self.conn.clone();
        let () = conn
            .set_ex(key, value, seconds)
            .await
            .with_context(|| format!("SETEX {key} failed"))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .with_context(|| format!("GET {key} failed"))?;
        Ok(value)
    }
}
