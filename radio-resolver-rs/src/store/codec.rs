use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stations::Station;

pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Persisted form of one resolution result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub key: String,
    pub stations: Vec<Station>,
    #[serde(rename = "savedAt")]
    pub saved_at: DateTime<Utc>,
}

impl CacheRecord {
    pub fn new(key: &str, stations: &[Station], saved_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION,
            key: key.to_string(),
            stations: stations.to_vec(),
            saved_at,
        }
    }

    /// Fresh while `now - saved_at < ttl`. A record stamped in the future
    /// has no trustworthy age and is stale.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.saved_at <= now && now - self.saved_at < ttl
    }
}

/// Trait for encoding/decoding cache records
pub trait CacheCodec: Send + Sync {
    fn name(&self) -> &'static str;
    fn encode(&self, record: &CacheRecord) -> Result<Vec<u8>>;
    fn decode(&self, data: &[u8]) -> Result<CacheRecord>;
}

/// Plain JSON, readable on disk and in redis-cli.
pub struct JsonCodec;

impl CacheCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, record: &CacheRecord) -> Result<Vec<u8>> {
        serde_json::to_vec(record).map_err(|e| anyhow!("cache record serialization failed: {}", e))
    }

    fn decode(&self, data: &[u8]) -> Result<CacheRecord> {
        let record: CacheRecord = serde_json::from_slice(data)
            .map_err(|e| anyhow!("cache record deserialization failed: {}", e))?;
        if record.schema_version != CACHE_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported cache schema version {}",
                record.schema_version
            ));
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rejects_foreign_schema_version() {
        let raw = br#"{"schemaVersion":99,"key":"us","stations":[],"savedAt":"2024-01-01T00:00:00Z"}"#;
        assert!(JsonCodec.decode(raw).is_err());
    }

    #[test]
    fn rejects_untyped_payloads() {
        assert!(JsonCodec.decode(b"[[\"name\",\"url\",\"country\"]]").is_err());
        assert!(JsonCodec.decode(b"not json").is_err());
    }

    #[test]
    fn freshness_boundary_is_exclusive() {
        let saved = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = CacheRecord::new("us", &[], saved);
        let ttl = chrono::Duration::hours(24);
        assert!(record.is_fresh(saved + chrono::Duration::hours(23), ttl));
        assert!(!record.is_fresh(saved + ttl, ttl));
    }

    #[test]
    fn future_timestamp_is_stale() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let ttl = chrono::Duration::hours(24);
        let ahead = CacheRecord::new("us", &[], now + chrono::Duration::days(365));
        assert!(!ahead.is_fresh(now, ttl));
        assert!(!ahead.is_fresh(now + chrono::Duration::days(300), ttl));
        let slightly_ahead = CacheRecord::new("us", &[], now + chrono::Duration::seconds(1));
        assert!(!slightly_ahead.is_fresh(now, ttl));
    }
}
