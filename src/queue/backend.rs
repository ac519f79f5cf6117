use std::collections::{BTreeSet, HashMap, VecDeque};

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Byte-oriented list store backing the per-tenant queues.
///
/// Values are inserted at the front and removed from the back, so every list
/// is a FIFO.
#[async_trait]
pub trait ListBackend: Send + Sync {
    async fn len(&self, key: &str) -> Result<u64>;

    /// Inserts `values` at the front in order; the first value leaves first.
    /// Returns the new length.
    async fn push_front(&self, key: &str, values: Vec<Vec<u8>>) -> Result<u64>;

    /// Puts `values` back at the removal end so the first value leaves next.
    async fn push_back(&self, key: &str, values: Vec<Vec<u8>>) -> Result<u64>;

    /// Removes up to `count` values from the back in one atomic step.
    async fn pop_back(&self, key: &str, count: usize) -> Result<Vec<Vec<u8>>>;

    async fn add_member(&self, set: &str, member: &str) -> Result<()>;

    async fn members(&self, set: &str) -> Result<Vec<String>>;

    async fn ping(&self) -> Result<()>;
}

/// Redis lists: LPUSH in, RPOP out.
#[derive(Clone)]
pub struct RedisListBackend {
    conn: ConnectionManager,
}

impl RedisListBackend {
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ListBackend for RedisListBackend {
    async fn len(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn
            .llen(key)
            .await
            .with_context(|| format!("LLEN {key} failed"))?;
        Ok(len)
    }

    async fn push_front(&self, key: &str, values: Vec<Vec<u8>>) -> Result<u64> {
        if values.is_empty() {
            return self.len(key).await;
        }
        let mut conn = self.conn.clone();
        let len: u64 = conn
            .lpush(key, values)
            .await
            .with_context(|| format!("LPUSH {key} failed"))?;
        Ok(len)
    }

    async fn push_back(&self, key: &str, mut values: Vec<Vec<u8>>) -> Result<u64> {
        if values.is_empty() {
            return self.len(key).await;
        }
        // RPUSH appends left to right, so the first value must go last.
        values.reverse();
        let mut conn = self.conn.clone();
        let len: u64 = conn
            .rpush(key, values)
            .await
            .with_context(|| format!("RPUSH {key} failed"))?;
        Ok(len)
    }

    async fn pop_back(&self, key: &str, count: usize) -> Result<Vec<Vec<u8>>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for _ in 0..count {
            pipe.rpop(key, None);
        }

        let mut conn = self.conn.clone();
        let popped: Vec<Option<Vec<u8>>> = pipe
            .query_async(&mut conn)
            .await
            .with_context(|| format!("RPOP pipeline on {key} failed"))?;

        Ok(popped.into_iter().map_while(|value| value).collect())
    }

    async fn add_member(&self, set: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .sadd(set, member)
            .await
            .with_context(|| format!("SADD {set} failed"))?;
        Ok(())
    }

    async fn members(&self, set: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn
            .smembers(set)
            .await
            .with_context(|| format!("SMEMBERS {set} failed"))?;
        Ok(members)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("redis ping failed")?;
        Ok(())
    }
}

/// In-process lists for tests and single-node development.
#[derive(Debug, Default)]
pub struct MemoryListBackend {
    lists: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    sets: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl MemoryListBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListBackend for MemoryListBackend {
    async fn len(&self, key: &str) -> Result<u64> {
        Ok(self.lists.lock().get(key).map_or(0, |list| list.len() as u64))
    }

    async fn push_front(&self, key: &str, values: Vec<Vec<u8>>) -> Result<u64> {
        let mut lists = self.lists.lock();
        let list = lists.entry(key.to_string()).or_default();
        for value in values {
            list.push_front(value);
        }
        Ok(list.len() as u64)
    }

    async fn push_back(&self, key: &str, values: Vec<Vec<u8>>) -> Result<u64> {
        let mut lists = self.lists.lock();
        let list = lists.entry(key.to_string()).or_default();
        for value in values.into_iter().rev() {
            list.push_back(value);
        }
        Ok(list.len() as u64)
    }

    async fn pop_back(&self, key: &str, count: usize) -> Result<Vec<Vec<u8>>> {
        let mut lists = self.lists.lock();
        let Some(list) = lists.get_mut(key) else {
            return Ok(Vec::new());
        };
        let mut popped = Vec::with_capacity(count.min(list.len()));
        while popped.len() < count {
            match list.pop_back() {
                Some(value) => popped.push(value),
                None => break,
            }
        }
        Ok(popped)
    }

    async fn add_member(&self, set: &str, member: &str) -> Result<()> {
        self.sets
            .lock()
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn members(&self, set: &str) -> Result<Vec<String>> {
        Ok(self
            .sets
            .lock()
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
