//! Redis adapter exposing the set and sorted-set primitives the rest of the
//! crate is written against.
//!
//! All mutable state lives in Redis; this type only holds a cloneable
//! [`ConnectionManager`], so it is cheap to share across tasks and threads.
//! Errors from the server (transport, scripting, memory) propagate unchanged.

use anyhow::Context;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, FromRedisValue, Script};
use tracing::{debug, info, instrument};

use crate::error::Result;

/// Async Redis adapter for unordered sets, sorted sets, and atomic scripts.
#[derive(Clone)]
pub struct SetStore {
    manager: ConnectionManager,
}

impl SetStore {
    /// Connect to Redis and verify the connection with a PING.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the server is unreachable.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = Client::open(url).context("Failed to create Redis client")?;

        let manager = ConnectionManager::new(client)
            .await
            .context("Failed to create Redis connection manager")?;

        let mut conn = manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .context("Redis ping failed")?;

        info!("Connected to Redis");

        Ok(Self { manager })
    }

    /// Connect using `REDIS_URL`, defaulting to `redis://127.0.0.1:6379`.
    pub async fn from_env() -> anyhow::Result<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        Self::connect(&url).await
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// True when the server answers PING.
    pub async fn ping(&self) -> bool {
        let mut conn = self.conn();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .is_ok()
    }

    // ---------- unordered sets ----------

    pub async fn sadd(&self, key: &str, members: &[String]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        conn.sadd::<_, _, ()>(key, members).await?;
        Ok(())
    }

    pub async fn srem(&self, key: &str, members: &[String]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        conn.srem::<_, _, ()>(key, members).await?;
        Ok(())
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        Ok(conn.smembers(key).await?)
    }

    pub async fn scard(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn();
        Ok(conn.scard(key).await?)
    }

    pub async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn();
        Ok(conn.sismember(key, member).await?)
    }

    /// Union of the given set keys. An empty key list yields an empty union.
    pub async fn sunion(&self, keys: &[String]) -> Result<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn();
        Ok(conn.sunion(keys).await?)
    }

    pub async fn del(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        conn.del::<_, ()>(keys).await?;
        Ok(())
    }

    /// Delete every key matching `pattern`, returning how many were removed.
    #[instrument(skip(self), fields(pattern = %pattern))]
    pub async fn del_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.conn();

        let keys: Vec<String> = conn.keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let count: u64 = conn.del(&keys).await?;
        debug!(deleted = %count, "Deleted keys by pattern");
        Ok(count)
    }

    // ---------- sorted sets ----------

    pub async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut conn = self.conn();
        conn.zadd::<_, _, _, ()>(key, member, score).await?;
        Ok(())
    }

    pub async fn zincrby(&self, key: &str, member: &str, delta: f64) -> Result<f64> {
        let mut conn = self.conn();
        Ok(conn.zincr(key, member, delta).await?)
    }

    pub async fn zrem(&self, key: &str, members: &[String]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        conn.zrem::<_, _, ()>(key, members).await?;
        Ok(())
    }

    pub async fn zcard(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn();
        Ok(conn.zcard(key).await?)
    }

    /// Rank-range read, ascending by score.
    pub async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>> {
        let mut conn = self.conn();
        Ok(conn.zrange_withscores(key, start, stop).await?)
    }

    /// Rank-range read, descending by score.
    pub async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>> {
        let mut conn = self.conn();
        Ok(conn.zrevrange_withscores(key, start, stop).await?)
    }

    /// Rank-range read, descending by score, members only.
    pub async fn zrevrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.conn();
        Ok(conn.zrevrange(key, start, stop).await?)
    }

    /// Keep only the `k` highest-scoring members (no-op when `k` is 0).
    pub async fn ztrim_to_top(&self, key: &str, k: usize) -> Result<()> {
        if k == 0 {
            return Ok(());
        }
        let mut conn = self.conn();
        conn.zremrangebyrank::<_, ()>(key, 0, -(k as isize) - 1)
            .await?;
        Ok(())
    }

    // ---------- scripts ----------

    /// Run a server-side script (EVALSHA with automatic EVAL fallback).
    /// Scripts execute atomically with respect to other store commands.
    pub async fn eval_script<T: FromRedisValue>(
        &self,
        script: &Script,
        keys: &[String],
        args: &[String],
    ) -> Result<T> {
        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(key.as_str());
        }
        for arg in args {
            invocation.arg(arg.as_str());
        }

        let mut conn = self.conn();
        Ok(invocation.invoke_async(&mut conn).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> Option<SetStore> {
        match SetStore::from_env().await {
            Ok(store) => Some(store),
            Err(_) => {
                eprintln!("Skipping test: Redis not available");
                None
            }
        }
    }

    fn s(items: &[&str]) -> Vec<String> {
        items.iter().map(|i| i.to_string()).collect()
    }

    #[tokio::test]
    async fn set_roundtrip() {
        let Some(store) = setup().await else { return };
        let key = "simrec:test:store:set";
        store.del(&s(&[key])).await.unwrap();

        store.sadd(key, &s(&["a", "b", "b"])).await.unwrap();
        assert_eq!(store.scard(key).await.unwrap(), 2);
        assert!(store.sismember(key, "a").await.unwrap());

        store.srem(key, &s(&["a"])).await.unwrap();
        let mut members = store.smembers(key).await.unwrap();
        members.sort();
        assert_eq!(members, vec!["b"]);

        store.del(&s(&[key])).await.unwrap();
    }

    #[tokio::test]
    async fn sunion_of_nothing_is_empty() {
        let Some(store) = setup().await else { return };
        let union = store.sunion(&[]).await.unwrap();
        assert!(union.is_empty());
    }

    #[tokio::test]
    async fn sorted_set_trim_keeps_top_scores() {
        let Some(store) = setup().await else { return };
        let key = "simrec:test:store:zset";
        store.del(&s(&[key])).await.unwrap();

        store.zadd(key, "low", 0.1).await.unwrap();
        store.zadd(key, "mid", 0.5).await.unwrap();
        store.zadd(key, "high", 0.9).await.unwrap();
        assert_eq!(store.zcard(key).await.unwrap(), 3);

        store.ztrim_to_top(key, 2).await.unwrap();
        let top = store.zrevrange(key, 0, -1).await.unwrap();
        assert_eq!(top, vec!["high", "mid"]);

        // k = 0 means unbounded: nothing removed
        store.ztrim_to_top(key, 0).await.unwrap();
        assert_eq!(store.zcard(key).await.unwrap(), 2);

        store.del(&s(&[key])).await.unwrap();
    }

    #[tokio::test]
    async fn zincrby_accumulates() {
        let Some(store) = setup().await else { return };
        let key = "simrec:test:store:zincr";
        store.del(&s(&[key])).await.unwrap();

        store.zincrby(key, "m", 0.25).await.unwrap();
        let score = store.zincrby(key, "m", 0.5).await.unwrap();
        assert!((score - 0.75).abs() < 1e-9);

        store.del(&s(&[key])).await.unwrap();
    }

    #[tokio::test]
    async fn del_pattern_scopes_to_prefix() {
        let Some(store) = setup().await else { return };
        store.sadd("simrec:test:pat:1", &s(&["x"])).await.unwrap();
        store.sadd("simrec:test:pat:2", &s(&["y"])).await.unwrap();
        store.sadd("simrec:test:other", &s(&["z"])).await.unwrap();

        let deleted = store.del_pattern("simrec:test:pat:*").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.scard("simrec:test:other").await.unwrap(), 1);

        store.del(&s(&["simrec:test:other"])).await.unwrap();
    }

    #[tokio::test]
    async fn eval_script_runs_atomically() {
        let Some(store) = setup().await else { return };
        let key = "simrec:test:store:script";
        store.del(&s(&[key])).await.unwrap();

        let script = Script::new(
            r#"
            redis.call('SADD', KEYS[1], ARGV[1])
            return redis.call('SCARD', KEYS[1])
            "#,
        );
        let card: u64 = store
            .eval_script(&script, &s(&[key]), &s(&["member"]))
            .await
            .unwrap();
        assert_eq!(card, 1);

        store.del(&s(&[key])).await.unwrap();
    }
}
