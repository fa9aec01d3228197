use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};
use uuid::Uuid;

use super::StoreBackend;

/// One JSON file per key under `cache_dir`, plus a single append-only log file.
pub struct FileBackend {
    cache_dir: PathBuf,
    log_path: PathBuf,
    log_guard: Mutex<()>,
}

impl FileBackend {
    pub fn new(cache_dir: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            log_path: log_path.into(),
            log_guard: Mutex::new(()),
        }
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", file_stem(key)))
    }
}

/// Keys made of `[a-z0-9_-]` are used verbatim; anything else is hashed so
/// that a key can never escape the cache directory.
fn file_stem(key: &str) -> String {
    let safe = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if safe {
        key.to_string()
    } else {
        let digest = Sha256::digest(key.as_bytes());
        format!("q-{}", &hex::encode(digest)[..16])
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    Ok(())
}

#[async_trait]
impl StoreBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.record_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, key: &str, bytes: Vec<u8>, _ttl: Duration) -> Result<()> {
        let path = self.record_path(key);
        ensure_parent(&path).await?;
        let tmp = path.with_extension(format!("json.tmp-{}", Uuid::new_v4()));
        fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        if let Err(err) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(err).with_context(|| format!("failed to replace {}", path.display()));
        }
        Ok(())
    }

    async fn append_line(&self, line: &str) -> Result<()> {
        let _guard = self.log_guard.lock().await;
        ensure_parent(&self.log_path).await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await
            .with_context(|| format!("failed to open {}", self.log_path.display()))?;
        file.write_all(format!("{line}\n").as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
