use std::{env, time::Duration};

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::matcher::SimilarityKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub port: u16,
    pub allow_insecure_transports: bool,
    pub directory: DirectoryConfig,
    pub resolver: ResolverConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectoryConfig {
    pub base_url: String,
    pub user_agent: String,
    pub fetch_timeout_ms: u64,
    pub head_timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_secs: u64,
    pub max_pages: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolverConfig {
    pub match_threshold: u8,
    pub max_places: usize,
    pub max_stations: usize,
    pub courtesy_delay_ms: u64,
    pub cache_ttl_seconds: u64,
    pub budget_seconds: u64,
    pub similarity: SimilarityKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    File { cache_dir: String, log_path: String },
    Redis { url: String, key_prefix: String },
    Memory,
}

const DEFAULT_BASE_URL: &str = "https://radio.garden/api";
const MAX_DURATION_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            fetch_timeout_ms: 10_000,
            head_timeout_ms: 5_000,
            max_attempts: 3,
            backoff_base_secs: 2,
            max_pages: 50,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            match_threshold: 70,
            max_places: 5,
            max_stations: 10,
            courtesy_delay_ms: 1_000,
            cache_ttl_seconds: 24 * 60 * 60,
            budget_seconds: 300,
            similarity: SimilarityKind::Levenshtein,
        }
    }
}

impl DirectoryConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn head_timeout(&self) -> Duration {
        Duration::from_millis(self.head_timeout_ms)
    }
}

impl ResolverConfig {
    pub fn courtesy_delay(&self) -> Duration {
        Duration::from_millis(self.courtesy_delay_ms)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        bounded_seconds(self.cache_ttl_seconds)
    }

    /// `None` when the per-call budget is disabled.
    pub fn budget(&self) -> Option<chrono::Duration> {
        (self.budget_seconds > 0).then(|| bounded_seconds(self.budget_seconds))
    }
}

fn bounded_seconds(seconds: u64) -> chrono::Duration {
    let clamped = seconds.min(MAX_DURATION_SECONDS) as i64;
    chrono::Duration::try_seconds(clamped).unwrap_or_else(chrono::Duration::zero)
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let port = env_u16("PORT", 4020)?;
        let allow_insecure_transports = env_bool("ALLOW_INSECURE_TRANSPORT").unwrap_or(false);
        let directory = DirectoryConfig::from_env(allow_insecure_transports)?;
        let resolver = ResolverConfig::from_env()?;
        let store = StoreConfig::from_env()?;

        Ok(Self {
            port,
            allow_insecure_transports,
            directory,
            resolver,
            store,
        })
    }
}

impl DirectoryConfig {
    fn from_env(allow_insecure_transports: bool) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            base_url: env::var("DIRECTORY_BASE_URL").unwrap_or(defaults.base_url),
            user_agent: env::var("DIRECTORY_USER_AGENT").unwrap_or(defaults.user_agent),
            fetch_timeout_ms: env_u64("DIRECTORY_FETCH_TIMEOUT_MS", defaults.fetch_timeout_ms)?,
            head_timeout_ms: env_u64("DIRECTORY_HEAD_TIMEOUT_MS", defaults.head_timeout_ms)?,
            max_attempts: env_u32("DIRECTORY_MAX_ATTEMPTS", defaults.max_attempts)?,
            backoff_base_secs: env_u64("DIRECTORY_BACKOFF_BASE_SECS", defaults.backoff_base_secs)?,
            max_pages: env_u32("DIRECTORY_MAX_PAGES", defaults.max_pages)?,
        };
        config.validate(allow_insecure_transports)?;
        Ok(config)
    }

    pub fn validate(&self, allow_insecure_transports: bool) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Message(
                "DIRECTORY_MAX_ATTEMPTS must be greater than zero.".into(),
            ));
        }
        if self.fetch_timeout_ms == 0 || self.head_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Directory timeouts must be greater than zero.".into(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Message(
                "A directory user agent must be provided.".into(),
            ));
        }
        let base_url = Url::parse(&self.base_url)
            .map_err(|err| ConfigError::Message(format!("Invalid directory base URL: {err}")))?;
        if base_url.scheme() != "https" && !allow_insecure_transports {
            return Err(ConfigError::Message(
                "Directory endpoints must use HTTPS unless ALLOW_INSECURE_TRANSPORT=true".into(),
            ));
        }
        Ok(())
    }
}

impl ResolverConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let similarity = match env::var("RESOLVER_SIMILARITY") {
            Ok(value) => SimilarityKind::parse(&value).ok_or_else(|| {
                ConfigError::Message(
                    "RESOLVER_SIMILARITY must be `levenshtein` or `jaro-winkler`".into(),
                )
            })?,
            Err(_) => defaults.similarity,
        };
        let config = Self {
            match_threshold: env_u8("RESOLVER_MATCH_THRESHOLD", defaults.match_threshold)?,
            max_places: env_usize("RESOLVER_MAX_PLACES", defaults.max_places)?,
            max_stations: env_usize("RESOLVER_MAX_STATIONS", defaults.max_stations)?,
            courtesy_delay_ms: env_u64("RESOLVER_COURTESY_DELAY_MS", defaults.courtesy_delay_ms)?,
            cache_ttl_seconds: env_u64("RESOLVER_CACHE_TTL_SECONDS", defaults.cache_ttl_seconds)?,
            budget_seconds: env_u64("RESOLVER_BUDGET_SECONDS", defaults.budget_seconds)?,
            similarity,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.match_threshold > 100 {
            return Err(ConfigError::Message(
                "RESOLVER_MATCH_THRESHOLD cannot exceed 100.".into(),
            ));
        }
        if self.max_places == 0 {
            return Err(ConfigError::Message(
                "RESOLVER_MAX_PLACES must be greater than zero.".into(),
            ));
        }
        if self.max_stations == 0 {
            return Err(ConfigError::Message(
                "RESOLVER_MAX_STATIONS must be greater than zero.".into(),
            ));
        }
        if self.cache_ttl_seconds > MAX_DURATION_SECONDS {
            return Err(ConfigError::Message(format!(
                "RESOLVER_CACHE_TTL_SECONDS cannot exceed {MAX_DURATION_SECONDS}."
            )));
        }
        if self.budget_seconds > MAX_DURATION_SECONDS {
            return Err(ConfigError::Message(format!(
                "RESOLVER_BUDGET_SECONDS cannot exceed {MAX_DURATION_SECONDS}."
            )));
        }
        Ok(())
    }
}

impl StoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let backend = env::var("RESOLVER_STORE").unwrap_or_else(|_| "file".into());
        match backend.to_ascii_lowercase().as_str() {
            "file" => Ok(StoreConfig::File {
                cache_dir: env::var("RESOLVER_CACHE_DIR")
                    .unwrap_or_else(|_| "exports/cache".into()),
                log_path: env::var("RESOLVER_LOG_PATH")
                    .unwrap_or_else(|_| "exports/scraper_log.txt".into()),
            }),
            "redis" => {
                let url = env_required("REDIS_URL")?;
                let key_prefix = env::var("RESOLVER_REDIS_PREFIX")
                    .unwrap_or_else(|_| "radio:resolver:".into());
                if key_prefix.trim().is_empty() {
                    return Err(ConfigError::Message(
                        "RESOLVER_REDIS_PREFIX must not be empty.".into(),
                    ));
                }
                Ok(StoreConfig::Redis { url, key_prefix })
            }
            "memory" => Ok(StoreConfig::Memory),
            other => Err(ConfigError::Message(format!(
                "RESOLVER_STORE must be file, redis or memory (got {other})"
            ))),
        }
    }
}

fn env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Message(format!("{key} must be set")))
}

fn env_u8(key: &str, default: u8) -> Result<u8, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Message(format!("{key} must be a valid u8"))),
        Err(_) => Ok(default),
    }
}

fn env_u16(key: &str, default: u16) -> Result<u16, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Message(format!("{key} must be a valid u16"))),
        Err(_) => Ok(default),
    }
}

fn env_u32(key: &str, default: u32) -> Result<u32, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Message(format!("{key} must be a valid u32"))),
        Err(_) => Ok(default),
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Message(format!("{key} must be a valid u64"))),
        Err(_) => Ok(default),
    }
}

fn env_usize(key: &str, default: usize) -> Result<usize, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Message(format!("{key} must be a valid usize"))),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str) -> Option<bool> {
    match env::var(key) {
        Ok(value) => match value.to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        Err(_) => None,
    }
}
