use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use deadpool_redis::{redis::AsyncCommands, Config as RedisConfig, Pool as RedisPool, Runtime};

use super::StoreBackend;

pub fn create_redis_pool(redis_url: &str) -> Result<RedisPool> {
    let cfg = RedisConfig::from_url(redis_url.to_string());
    Ok(cfg.create_pool(Some(Runtime::Tokio1))?)
}

/// Records live under `{prefix}cache:{key}` with a server-side expiry; log
/// lines are pushed onto the `{prefix}log` list.
pub struct RedisBackend {
    redis: RedisPool,
    key_prefix: String,
}

impl RedisBackend {
    pub fn new(redis: RedisPool, key_prefix: impl Into<String>) -> Self {
        Self {
            redis,
            key_prefix: key_prefix.into(),
        }
    }

    fn record_key(&self, key: &str) -> String {
        format!("{}cache:{}", self.key_prefix, key)
    }

    fn log_key(&self) -> String {
        format!("{}log", self.key_prefix)
    }
}

#[async_trait]
impl StoreBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.redis.get().await?;
        let data: Option<Vec<u8>> = conn.get(self.record_key(key)).await?;
        Ok(data)
    }

    async fn save(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.redis.get().await?;
        let ttl_seconds = ttl.as_secs();
        if ttl_seconds > 0 {
            conn.set_ex::<_, _, ()>(self.record_key(key), bytes, ttl_seconds)
                .await?;
        } else {
            conn.set::<_, _, ()>(self.record_key(key), bytes).await?;
        }
        Ok(())
    }

    async fn append_line(&self, line: &str) -> Result<()> {
        let mut conn = self.redis.get().await?;
        conn.rpush::<_, _, ()>(self.log_key(), line).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.redis.get().await?;
        deadpool_redis::redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}
