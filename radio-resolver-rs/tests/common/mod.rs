#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use radio_resolver_rs::{
    clock::ManualClock,
    config::{DirectoryConfig, ResolverConfig},
    directory::{DirectoryClient, Transport, TransportError},
    journal::Journal,
    logging::Logger,
    store::{MemoryBackend, StationStore},
    Resolver, ResolverDeps,
};
use serde_json::{json, Value};
use url::Url;

pub const BASE_URL: &str = "https://directory.test/api";

pub fn places_url(page: u32) -> String {
    if page > 1 {
        format!("{BASE_URL}/ara/content/places?page={page}")
    } else {
        format!("{BASE_URL}/ara/content/places")
    }
}

pub fn channels_url(place_id: &str) -> String {
    format!("{BASE_URL}/ara/content/page/{place_id}/channels")
}

pub fn stream_url(page_id: &str) -> String {
    format!("{BASE_URL}/ara/content/listen/{page_id}/channel.m3u")
}

pub fn places_body(places: &[(&str, &str, &str)]) -> Value {
    let list: Vec<Value> = places
        .iter()
        .map(|(id, country, code)| {
            json!({ "id": id, "title": format!("City {id}"), "country": country, "countryCode": code })
        })
        .collect();
    json!({ "data": { "list": list } })
}

pub fn channels_body(channels: &[(&str, &str)]) -> Value {
    let items: Vec<Value> = channels
        .iter()
        .map(|(title, page_id)| json!({ "title": title, "page": { "id": page_id } }))
        .collect();
    json!({ "data": { "content": [ { "items": items } ] } })
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
}

#[derive(Clone)]
pub enum Reply {
    Json(Value),
    Fail(TransportError),
}

/// Replies to GETs from per-URL queues (the last reply repeats) and to HEADs
/// from a status table. Unrouted GETs fail with 404; unrouted HEADs answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    gets: Mutex<HashMap<String, VecDeque<Reply>>>,
    heads: Mutex<HashMap<String, Result<u16, TransportError>>>,
    calls: Mutex<Vec<(Method, String)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_get(self, url: impl Into<String>, reply: Reply) -> Self {
        self.gets
            .lock()
            .unwrap()
            .entry(url.into())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn json(self, url: impl Into<String>, body: Value) -> Self {
        self.on_get(url, Reply::Json(body))
    }

    pub fn failing(self, url: impl Into<String>, error: TransportError) -> Self {
        self.on_get(url, Reply::Fail(error))
    }

    pub fn head(self, url: impl Into<String>, status: u16) -> Self {
        self.heads.lock().unwrap().insert(url.into(), Ok(status));
        self
    }

    pub fn head_error(self, url: impl Into<String>, error: TransportError) -> Self {
        self.heads.lock().unwrap().insert(url.into(), Err(error));
        self
    }

    pub fn calls(&self) -> Vec<(Method, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn get_calls(&self) -> Vec<String> {
        self.calls_of(Method::Get)
    }

    pub fn head_calls(&self) -> Vec<String> {
        self.calls_of(Method::Head)
    }

    pub fn count_gets(&self, url: &str) -> usize {
        self.get_calls().iter().filter(|call| *call == url).count()
    }

    fn calls_of(&self, method: Method) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| *m == method)
            .map(|(_, url)| url.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get_json(&self, url: &Url, _timeout: Duration) -> Result<Value, TransportError> {
        let key = url.to_string();
        self.calls.lock().unwrap().push((Method::Get, key.clone()));
        let mut gets = self.gets.lock().unwrap();
        let reply = match gets.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match reply {
            Some(Reply::Json(body)) => Ok(body),
            Some(Reply::Fail(error)) => Err(error),
            None => Err(TransportError::Status(404)),
        }
    }

    async fn head(&self, url: &Url, _timeout: Duration) -> Result<u16, TransportError> {
        let key = url.to_string();
        self.calls.lock().unwrap().push((Method::Head, key.clone()));
        self.heads
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or(Ok(404))
    }
}

pub fn directory_config() -> DirectoryConfig {
    DirectoryConfig {
        base_url: BASE_URL.to_string(),
        ..DirectoryConfig::default()
    }
}

pub struct Harness {
    pub resolver: Resolver,
    pub transport: Arc<ScriptedTransport>,
    pub backend: Arc<MemoryBackend>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(transport: ScriptedTransport) -> Self {
        Self::with_settings(transport, ResolverConfig::default())
    }

    pub fn with_settings(transport: ScriptedTransport, settings: ResolverConfig) -> Self {
        Self::with_parts(
            Arc::new(transport),
            Arc::new(MemoryBackend::new()),
            Arc::new(ManualClock::new(start_time())),
            settings,
        )
    }

    pub fn with_parts(
        transport: Arc<ScriptedTransport>,
        backend: Arc<MemoryBackend>,
        clock: Arc<ManualClock>,
        settings: ResolverConfig,
    ) -> Self {
        let resolver = Resolver::new(
            directory_config(),
            settings,
            ResolverDeps {
                transport: transport.clone(),
                backend: backend.clone(),
                clock: clock.clone(),
                logger: Logger::new("resolver-test"),
            },
        )
        .unwrap();
        Self {
            resolver,
            transport,
            backend,
            clock,
        }
    }

    pub async fn log_lines(&self) -> Vec<String> {
        self.backend.log_lines().await
    }

    pub async fn logged(&self, needle: &str) -> bool {
        self.log_lines().await.iter().any(|line| line.contains(needle))
    }
}

pub struct DirectoryHarness {
    pub client: DirectoryClient,
    pub transport: Arc<ScriptedTransport>,
    pub backend: Arc<MemoryBackend>,
    pub clock: Arc<ManualClock>,
}

impl DirectoryHarness {
    pub fn new(transport: ScriptedTransport) -> Self {
        Self::with_config(transport, directory_config())
    }

    pub fn with_config(transport: ScriptedTransport, config: DirectoryConfig) -> Self {
        let transport = Arc::new(transport);
        let backend = Arc::new(MemoryBackend::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let logger = Logger::new("directory-test");
        let store = Arc::new(StationStore::new(
            backend.clone(),
            clock.clone(),
            chrono::Duration::hours(24),
            logger.clone(),
        ));
        let journal = Journal::new(logger, store);
        let client =
            DirectoryClient::new(config, transport.clone(), clock.clone(), journal).unwrap();
        Self {
            client,
            transport,
            backend,
            clock,
        }
    }
}
