use std::{collections::HashMap, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use super::StoreBackend;

/// Process-local backend. Records vanish with the process.
#[derive(Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<String, Vec<u8>>>,
    lines: Mutex<Vec<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw bytes under `key`, bypassing the codec.
    pub async fn insert_raw(&self, key: &str, bytes: Vec<u8>) {
        self.records.write().await.insert(key.to_string(), bytes);
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.records.read().await.contains_key(key)
    }

    pub async fn log_lines(&self) -> Vec<String> {
        self.lines.lock().await.clone()
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, bytes: Vec<u8>, _ttl: Duration) -> Result<()> {
        self.records.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn append_line(&self, line: &str) -> Result<()> {
        self.lines.lock().await.push(line.to_string());
        Ok(())
    }
}
