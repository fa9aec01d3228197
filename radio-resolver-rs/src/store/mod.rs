mod codec;
mod file;
mod memory;
mod redis;

pub use codec::{CacheCodec, CacheRecord, JsonCodec, CACHE_SCHEMA_VERSION};
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use redis::{create_redis_pool, RedisBackend};

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::Mutex;

use crate::{
    clock::Clock,
    config::StoreConfig,
    logging::Logger,
    stations::{dedupe_stations, Station},
};

/// Raw storage medium behind the station cache and the event log.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn save(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<()>;
    async fn append_line(&self, line: &str) -> Result<()>;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

pub fn build_backend(config: &StoreConfig) -> Result<Arc<dyn StoreBackend>> {
    Ok(match config {
        StoreConfig::File {
            cache_dir,
            log_path,
        } => Arc::new(FileBackend::new(cache_dir, log_path)),
        StoreConfig::Redis { url, key_prefix } => {
            let pool = create_redis_pool(url).context("failed to create redis pool")?;
            Arc::new(RedisBackend::new(pool, key_prefix.clone()))
        }
        StoreConfig::Memory => Arc::new(MemoryBackend::new()),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    pub fn render(&self) -> String {
        format!(
            "[{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.message
        )
    }
}

/// One async mutex per key; entries are pruned once nobody holds them.
#[derive(Default)]
struct KeyLocks {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    fn acquire(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        // The map holds one reference and `lock` another.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(key);
        }
    }
}

/// Cache & log store: TTL-checked station records plus an append-only log.
pub struct StationStore {
    backend: Arc<dyn StoreBackend>,
    codec: Box<dyn CacheCodec>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    locks: KeyLocks,
    logger: Logger,
}

impl StationStore {
    pub fn new(
        backend: Arc<dyn StoreBackend>,
        clock: Arc<dyn Clock>,
        ttl: chrono::Duration,
        logger: Logger,
    ) -> Self {
        Self {
            backend,
            codec: Box::new(JsonCodec),
            clock,
            ttl,
            locks: KeyLocks::default(),
            logger,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn ping(&self) -> Result<()> {
        self.backend.ping().await
    }

    /// Fresh stations for `key`, or `None` when absent, unreadable or stale.
    pub async fn get(&self, key: &str) -> Option<Vec<Station>> {
        let bytes = match self.backend.load(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                self.logger.warn(
                    "cache.read.error",
                    json!({ "backend": self.backend.name(), "key": key, "error": format!("{err:#}") }),
                );
                return None;
            }
        };

        let record = match self.codec.decode(&bytes) {
            Ok(record) => record,
            Err(err) => {
                self.logger.warn(
                    "cache.read.decode_error",
                    json!({
                        "format": self.codec.name(),
                        "key": key,
                        "error": format!("{err:#}"),
                    }),
                );
                return None;
            }
        };

        if record.key != key || record.stations.is_empty() {
            return None;
        }

        let now = self.clock.now();
        if !record.is_fresh(now, self.ttl) {
            self.logger.debug(
                "cache.read.stale",
                json!({ "key": key, "savedAt": record.saved_at.to_rfc3339() }),
            );
            return None;
        }

        self.logger.debug(
            "cache.read.hit",
            json!({ "key": key, "stations": record.stations.len() }),
        );
        Some(dedupe_stations(record.stations))
    }

    /// Replaces the record for `key`. Writers for the same key are serialized.
    pub async fn put(&self, key: &str, stations: &[Station]) -> Result<()> {
        let lock = self.locks.acquire(key);
        let result = {
            let _guard = lock.lock().await;
            let record = CacheRecord::new(key, stations, self.clock.now());
            let bytes = self.codec.encode(&record)?;
            let size = bytes.len();
            let ttl = self.ttl.to_std().unwrap_or_default();
            self.backend
                .save(key, bytes, ttl)
                .await
                .map(|_| size)
        };
        self.locks.release(key, lock);

        let size = result?;
        self.logger.info(
            "cache.write.success",
            json!({
                "format": self.codec.name(),
                "backend": self.backend.name(),
                "key": key,
                "bytes": size,
                "ttlSeconds": self.ttl.num_seconds(),
            }),
        );
        Ok(())
    }

    /// Best effort: a failed write is reported on the structured logger only.
    pub async fn append(&self, message: &str) {
        let entry = LogEntry {
            timestamp: self.clock.now(),
            message: message.to_string(),
        };
        if let Err(err) = self.backend.append_line(&entry.render()).await {
            self.logger.warn(
                "log_store.append_failed",
                json!({ "backend": self.backend.name(), "error": format!("{err:#}") }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 8, 30, 0).unwrap()
    }

    fn store_with(backend: Arc<MemoryBackend>, clock: Arc<ManualClock>) -> StationStore {
        StationStore::new(
            backend,
            clock,
            chrono::Duration::hours(24),
            Logger::new("store-test"),
        )
    }

    #[tokio::test]
    async fn put_then_get_within_ttl() {
        let backend = Arc::new(MemoryBackend::new());
        let clock = Arc::new(ManualClock::new(start()));
        let store = store_with(backend, clock.clone());
        let stations = vec![Station::new("A", "https://x/a", "Spain")];

        store.put("spain", &stations).await.unwrap();
        clock.advance(chrono::Duration::hours(23));
        assert_eq!(store.get("spain").await, Some(stations));
    }

    #[tokio::test]
    async fn entries_at_ttl_are_stale() {
        let backend = Arc::new(MemoryBackend::new());
        let clock = Arc::new(ManualClock::new(start()));
        let store = store_with(backend, clock.clone());
        store
            .put("spain", &[Station::new("A", "https://x/a", "Spain")])
            .await
            .unwrap();

        clock.advance(chrono::Duration::hours(24));
        assert!(store.get("spain").await.is_none());
    }

    #[tokio::test]
    async fn corrupt_record_is_a_miss() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_raw("spain", b"{\"stations\": oops".to_vec()).await;
        let store = store_with(backend, Arc::new(ManualClock::new(start())));
        assert!(store.get("spain").await.is_none());
    }

    #[tokio::test]
    async fn record_for_other_key_is_a_miss() {
        let backend = Arc::new(MemoryBackend::new());
        let record = CacheRecord::new("france", &[Station::new("A", "u", "France")], start());
        backend
            .insert_raw("spain", JsonCodec.encode(&record).unwrap())
            .await;
        let store = store_with(backend, Arc::new(ManualClock::new(start())));
        assert!(store.get("spain").await.is_none());
    }

    #[tokio::test]
    async fn record_from_a_clock_ahead_is_a_miss() {
        let backend = Arc::new(MemoryBackend::new());
        let stations = vec![Station::new("A", "https://x/a", "Spain")];
        let record = CacheRecord::new("spain", &stations, start() + chrono::Duration::days(365));
        backend
            .insert_raw("spain", JsonCodec.encode(&record).unwrap())
            .await;
        let clock = Arc::new(ManualClock::new(start()));
        let store = store_with(backend, clock.clone());

        assert!(store.get("spain").await.is_none());
        clock.advance(chrono::Duration::days(300));
        assert!(store.get("spain").await.is_none());
    }

    #[tokio::test]
    async fn append_writes_timestamped_line() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone(), Arc::new(ManualClock::new(start())));
        store.append("Using cached data for US").await;
        assert_eq!(
            backend.log_lines().await,
            vec!["[2024-03-10 08:30:00] Using cached data for US".to_string()]
        );
    }

    #[tokio::test]
    async fn concurrent_puts_leave_one_complete_record() {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(store_with(
            backend.clone(),
            Arc::new(ManualClock::new(start())),
        ));
        let mut handles = Vec::new();
        for idx in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let station = Station::new(format!("S{idx}"), format!("https://x/{idx}"), "Spain");
                store.put("spain", &[station]).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let stations = store.get("spain").await.unwrap();
        assert_eq!(stations.len(), 1);
        assert!(store.locks.locks.lock().unwrap().is_empty());
    }
}
