mod payload;
mod retry;
mod transport;

pub use payload::{ChannelRef, Place};
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, Transport, TransportError};

use std::{collections::HashSet, sync::Arc};

use serde_json::{json, Value};
use thiserror::Error;
use url::Url;

use crate::{clock::Clock, config::DirectoryConfig, journal::Journal};

const PLACES_PATH: &str = "ara/content/places";
const CHANNELS_PATH: &str = "ara/content/page";
const LISTEN_PATH: &str = "ara/content/listen";

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("invalid directory url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("malformed payload from {url}: {source}")]
    MalformedPayload {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of a data fetch. `Unavailable` means every attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch<T> {
    Ready(T),
    Unavailable,
}

#[derive(Clone)]
pub struct DirectoryClient {
    config: DirectoryConfig,
    base_url: String,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    journal: Journal,
    retry: RetryPolicy,
}

impl DirectoryClient {
    pub fn new(
        config: DirectoryConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        journal: Journal,
    ) -> Result<Self, DirectoryError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|source| DirectoryError::InvalidUrl {
            url: base_url.clone(),
            source,
        })?;
        let retry = RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            backoff_base_secs: config.backoff_base_secs,
        };
        Ok(Self {
            config,
            base_url,
            transport,
            clock,
            journal,
            retry,
        })
    }

    fn build_url(&self, path: &str) -> Result<Url, DirectoryError> {
        let raw = format!("{}/{}", self.base_url, path);
        Url::parse(&raw).map_err(|source| DirectoryError::InvalidUrl { url: raw, source })
    }

    /// Page 1 is the bare listing; later pages add `?page=N`.
    pub fn places_url(&self, page: u32) -> Result<Url, DirectoryError> {
        let mut url = self.build_url(PLACES_PATH)?;
        if page > 1 {
            url.query_pairs_mut().append_pair("page", &page.to_string());
        }
        Ok(url)
    }

    pub fn channels_url(&self, place_id: &str) -> Result<Url, DirectoryError> {
        self.build_url(&format!(
            "{CHANNELS_PATH}/{}/channels",
            urlencoding::encode(place_id)
        ))
    }

    pub fn stream_url(&self, station_page_id: &str) -> Result<Url, DirectoryError> {
        self.build_url(&format!(
            "{LISTEN_PATH}/{}/channel.m3u",
            urlencoding::encode(station_page_id)
        ))
    }

    /// All places across every page the upstream is willing to serve.
    pub async fn fetch_places(&self) -> Result<Fetch<Vec<Place>>, DirectoryError> {
        let first_url = self.places_url(1)?;
        let body = match self.get_with_retry(&first_url).await {
            Fetch::Ready(body) => body,
            Fetch::Unavailable => {
                self.journal
                    .warn(
                        "directory.places.unavailable",
                        format!("Failed to fetch places from {first_url}"),
                        json!({ "url": first_url.as_str() }),
                    )
                    .await;
                return Ok(Fetch::Unavailable);
            }
        };
        let mut places = decode_places(&first_url, body)?;
        self.journal
            .info(
                "directory.places.page",
                format!("Places API response: {} places", places.len()),
                json!({ "page": 1, "count": places.len() }),
            )
            .await;
        if places.is_empty() {
            return Ok(Fetch::Ready(places));
        }

        let mut seen: HashSet<String> = places.iter().map(|place| place.id.clone()).collect();
        let mut page: u32 = 2;
        loop {
            if self.config.max_pages > 0 && page > self.config.max_pages {
                self.journal
                    .warn(
                        "directory.places.page_limit",
                        format!("Stopping pagination after {} pages", self.config.max_pages),
                        json!({ "maxPages": self.config.max_pages }),
                    )
                    .await;
                break;
            }

            let url = self.places_url(page)?;
            let batch = match self.get_once(&url).await {
                Fetch::Ready(body) => match payload::decode_places(body) {
                    Ok(batch) => batch,
                    Err(error) => {
                        self.journal
                            .warn(
                                "directory.places.page_malformed",
                                format!("Ignoring malformed page {url}: {error}"),
                                json!({ "url": url.as_str(), "error": error.to_string() }),
                            )
                            .await;
                        break;
                    }
                },
                Fetch::Unavailable => Vec::new(),
            };

            if batch.is_empty() {
                self.journal
                    .info(
                        "directory.places.exhausted",
                        format!("No more pages at {url}"),
                        json!({ "url": url.as_str(), "page": page }),
                    )
                    .await;
                break;
            }

            let unseen = batch
                .iter()
                .filter(|place| !seen.contains(&place.id))
                .count();
            if unseen == 0 {
                self.journal
                    .info(
                        "directory.places.unpaginated",
                        format!("Page {page} repeated known places, listing is not paginated"),
                        json!({ "url": url.as_str(), "page": page }),
                    )
                    .await;
                break;
            }

            self.journal
                .info(
                    "directory.places.page",
                    format!("Fetched page {page}: {} places", batch.len()),
                    json!({ "page": page, "count": batch.len() }),
                )
                .await;
            seen.extend(batch.iter().map(|place| place.id.clone()));
            places.extend(batch);
            page += 1;
        }

        Ok(Fetch::Ready(places))
    }

    pub async fn fetch_channels(
        &self,
        place_id: &str,
    ) -> Result<Fetch<Vec<ChannelRef>>, DirectoryError> {
        let url = self.channels_url(place_id)?;
        match self.get_with_retry(&url).await {
            Fetch::Ready(body) => {
                let channels = payload::decode_channels(body).map_err(|source| {
                    DirectoryError::MalformedPayload {
                        url: url.to_string(),
                        source,
                    }
                })?;
                Ok(Fetch::Ready(channels))
            }
            Fetch::Unavailable => Ok(Fetch::Unavailable),
        }
    }

    /// Single HEAD request; status or transport error is returned to the caller.
    pub async fn head_check(&self, url: &Url) -> Result<u16, TransportError> {
        self.transport.head(url, self.config.head_timeout()).await
    }

    async fn get_with_retry(&self, url: &Url) -> Fetch<Value> {
        let max_attempts = self.retry.max_attempts;
        for attempt in 1..=max_attempts {
            match self.attempt(url, attempt, max_attempts).await {
                Some(body) => return Fetch::Ready(body),
                None if self.retry.is_last(attempt) => {
                    self.journal
                        .error(
                            "directory.fetch.exhausted",
                            format!("Max retries reached for {url}"),
                            json!({ "url": url.as_str(), "attempts": max_attempts }),
                        )
                        .await;
                }
                None => self.clock.sleep(self.retry.delay_after(attempt)).await,
            }
        }
        Fetch::Unavailable
    }

    /// Best-effort request used for pagination beyond the first page.
    async fn get_once(&self, url: &Url) -> Fetch<Value> {
        match self.attempt(url, 1, 1).await {
            Some(body) => Fetch::Ready(body),
            None => Fetch::Unavailable,
        }
    }

    async fn attempt(&self, url: &Url, attempt: u32, max_attempts: u32) -> Option<Value> {
        match self
            .transport
            .get_json(url, self.config.fetch_timeout())
            .await
        {
            Ok(body) => {
                self.journal
                    .info(
                        "directory.fetch.success",
                        format!("Success: {url}"),
                        json!({ "url": url.as_str(), "attempt": attempt }),
                    )
                    .await;
                Some(body)
            }
            Err(error) => {
                self.journal
                    .warn(
                        "directory.fetch.attempt_failed",
                        format!("Attempt {attempt}/{max_attempts} failed for {url}: {error}"),
                        json!({
                            "url": url.as_str(),
                            "attempt": attempt,
                            "maxAttempts": max_attempts,
                            "error": error.to_string(),
                        }),
                    )
                    .await;
                None
            }
        }
    }
}

fn decode_places(url: &Url, body: Value) -> Result<Vec<Place>, DirectoryError> {
    payload::decode_places(body).map_err(|source| DirectoryError::MalformedPayload {
        url: url.to_string(),
        source,
    })
}
