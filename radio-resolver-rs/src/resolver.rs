use std::{any::Any, collections::BTreeSet, fmt, panic::AssertUnwindSafe, sync::Arc};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    channels::ChannelResolver,
    clock::{Clock, SystemClock},
    config::{Config, DirectoryConfig, ResolverConfig},
    directory::{DirectoryClient, DirectoryError, Fetch, HttpTransport, Transport},
    journal::Journal,
    logging::Logger,
    matcher::{country_label, title_case, NormalizedQuery, PlaceMatcher},
    stations::Station,
    store::{build_backend, StationStore, StoreBackend},
    stream_validation::StreamValidator,
};

/// Returned by `list_countries` when the places listing cannot be fetched.
pub const FALLBACK_COUNTRIES: &[&str] = &[
    "United States",
    "United Kingdom",
    "Canada",
    "Australia",
    "Germany",
    "France",
    "India",
    "Brazil",
    "South Africa",
    "Japan",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    FetchPlaces,
    Match,
    ResolveChannels,
    Validate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::FetchPlaces => "place fetch",
            Stage::Match => "matching",
            Stage::ResolveChannels => "channel resolution",
            Stage::Validate => "stream validation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("resolution budget exhausted before {stage}")]
    DeadlineExceeded { stage: Stage },
}

/// Collaborators injected into the resolver.
pub struct ResolverDeps {
    pub transport: Arc<dyn Transport>,
    pub backend: Arc<dyn StoreBackend>,
    pub clock: Arc<dyn Clock>,
    pub logger: Logger,
}

struct Deadline {
    expires_at: Option<DateTime<Utc>>,
}

impl Deadline {
    fn check(&self, clock: &dyn Clock, stage: Stage) -> Result<(), ResolveError> {
        match self.expires_at {
            Some(expires_at) if clock.now() >= expires_at => {
                Err(ResolveError::DeadlineExceeded { stage })
            }
            _ => Ok(()),
        }
    }
}

/// Country-to-station resolution: cache, places, matching, channels, streams.
pub struct Resolver {
    settings: ResolverConfig,
    store: Arc<StationStore>,
    directory: DirectoryClient,
    matcher: PlaceMatcher,
    channels: ChannelResolver,
    validator: StreamValidator,
    journal: Journal,
    clock: Arc<dyn Clock>,
}

impl Resolver {
    pub fn new(
        directory_config: DirectoryConfig,
        settings: ResolverConfig,
        deps: ResolverDeps,
    ) -> Result<Self, ResolveError> {
        let store = Arc::new(StationStore::new(
            deps.backend,
            deps.clock.clone(),
            settings.cache_ttl(),
            deps.logger.clone(),
        ));
        let journal = Journal::new(deps.logger, store.clone());
        let directory = DirectoryClient::new(
            directory_config,
            deps.transport,
            deps.clock.clone(),
            journal.clone(),
        )?;
        let matcher = PlaceMatcher::new(settings.similarity.scorer(), settings.match_threshold);
        let channels = ChannelResolver::new(directory.clone(), journal.clone());
        let validator = StreamValidator::new(directory.clone(), journal.clone());

        Ok(Self {
            settings,
            store,
            directory,
            matcher,
            channels,
            validator,
            journal,
            clock: deps.clock,
        })
    }

    /// Production wiring: reqwest transport, configured store, system clock.
    pub fn from_config(config: &Config, logger: Logger) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(
            &config.directory.user_agent,
            config.allow_insecure_transports,
        )?;
        let backend = build_backend(&config.store)?;
        let resolver = Self::new(
            config.directory.clone(),
            config.resolver.clone(),
            ResolverDeps {
                transport: Arc::new(transport),
                backend,
                clock: Arc::new(SystemClock),
                logger,
            },
        )?;
        Ok(resolver)
    }

    pub fn store(&self) -> &StationStore {
        &self.store
    }

    /// Live stations for `country`, best matches first. Never fails: any
    /// error, panic or exhausted budget is logged and yields an empty list.
    pub async fn resolve(&self, country: &str) -> Vec<Station> {
        let run_id = Uuid::new_v4().to_string();
        let journal = self.journal.for_run(&run_id);
        let Some(query) = NormalizedQuery::parse(country) else {
            journal
                .warn(
                    "resolve.blank_query",
                    "Ignoring blank country query".to_string(),
                    json!({}),
                )
                .await;
            return Vec::new();
        };

        let outcome = AssertUnwindSafe(self.run(&query, &journal))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(stations)) => stations,
            Ok(Err(error)) => {
                journal
                    .error(
                        "resolve.failed",
                        format!("Unexpected error scraping {country}: {error}"),
                        json!({ "query": query.display, "key": query.key, "error": format!("{error:?}") }),
                    )
                    .await;
                Vec::new()
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                journal
                    .error(
                        "resolve.panicked",
                        format!("Unexpected error scraping {country}: {detail}"),
                        json!({ "query": query.display, "key": query.key }),
                    )
                    .await;
                Vec::new()
            }
        }
    }

    async fn run(
        &self,
        query: &NormalizedQuery,
        journal: &Journal,
    ) -> Result<Vec<Station>, ResolveError> {
        let deadline = Deadline {
            expires_at: self.settings.budget().map(|budget| self.clock.now() + budget),
        };

        if let Some(stations) = self.store.get(&query.key).await {
            journal
                .info(
                    "resolve.cache_hit",
                    format!("Using cached data for {}", query.display),
                    json!({ "key": query.key, "count": stations.len() }),
                )
                .await;
            return Ok(stations);
        }

        journal
            .info(
                "resolve.started",
                format!(
                    "Scraping stations for: {} (Normalized: {})",
                    query.display, query.key
                ),
                json!({ "query": query.display, "key": query.key }),
            )
            .await;

        deadline.check(self.clock.as_ref(), Stage::FetchPlaces)?;
        let places = match self.directory.fetch_places().await? {
            Fetch::Ready(places) if !places.is_empty() => places,
            _ => {
                journal
                    .warn(
                        "resolve.no_places",
                        "No places found in API response".to_string(),
                        json!({ "query": query.display }),
                    )
                    .await;
                return Ok(Vec::new());
            }
        };

        deadline.check(self.clock.as_ref(), Stage::Match)?;
        let candidates = self.matcher.match_places(&places, query);
        if candidates.is_empty() {
            journal
                .info(
                    "resolve.no_match",
                    format!("No country match found for: {}", query.display),
                    json!({ "query": query.display, "places": places.len() }),
                )
                .await;
            return Ok(Vec::new());
        }
        journal
            .info(
                "resolve.matched",
                format!(
                    "{} places matched {} above score {}",
                    candidates.len(),
                    query.display,
                    self.matcher.threshold()
                ),
                json!({ "query": query.display, "matches": candidates.len() }),
            )
            .await;

        let cap = self.settings.max_stations;
        let mut stations: Vec<Station> = Vec::new();
        for (idx, candidate) in candidates
            .iter()
            .take(self.settings.max_places)
            .enumerate()
        {
            if stations.len() >= cap {
                break;
            }
            if idx > 0 {
                self.clock.sleep(self.settings.courtesy_delay()).await;
            }

            deadline.check(self.clock.as_ref(), Stage::ResolveChannels)?;
            let label = country_label(&candidate.place);
            journal
                .info(
                    "resolve.place",
                    format!(
                        "Processing place: {label} (ID: {}, Score: {})",
                        candidate.place.id, candidate.score
                    ),
                    json!({
                        "placeId": candidate.place.id,
                        "place": candidate.place.title,
                        "country": label,
                        "score": candidate.score,
                    }),
                )
                .await;
            let channels = self.channels.resolve_channels(&candidate.place).await?;
            if channels.is_empty() {
                continue;
            }

            deadline.check(self.clock.as_ref(), Stage::Validate)?;
            let summary = self
                .validator
                .validate_into(&channels, &label, &mut stations, cap)
                .await?;
            if summary.dropped > 0 || summary.skipped > 0 {
                journal.logger().info(
                    "stream.validation",
                    json!({
                        "placeId": candidate.place.id,
                        "dropped": summary.dropped,
                        "skipped": summary.skipped,
                        "reasons": summary.reasons,
                    }),
                );
            }
        }

        journal
            .info(
                "resolve.found",
                format!("Found {} stations for {}", stations.len(), query.display),
                json!({ "query": query.display, "count": stations.len() }),
            )
            .await;

        if !stations.is_empty() {
            match self.store.put(&query.key, &stations).await {
                Ok(()) => {
                    journal
                        .info(
                            "resolve.cached",
                            format!("Cached data saved for {}", query.display),
                            json!({ "key": query.key }),
                        )
                        .await
                }
                Err(error) => {
                    journal
                        .warn(
                            "resolve.cache_write_failed",
                            format!("Error saving cache for {}: {error:#}", query.display),
                            json!({ "key": query.key }),
                        )
                        .await
                }
            }
        }

        journal
            .info(
                "resolve.completed",
                format!("Resolution completed for {}", query.display),
                json!({ "query": query.display, "count": stations.len() }),
            )
            .await;
        Ok(stations)
    }

    /// Distinct country names known to the directory, sorted.
    pub async fn list_countries(&self) -> Vec<String> {
        match self.directory.fetch_places().await {
            Ok(Fetch::Ready(places)) if !places.is_empty() => places
                .iter()
                .map(|place| title_case(place.country_name.trim()))
                .filter(|name| !name.is_empty())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            outcome => {
                let reason = match outcome {
                    Err(error) => error.to_string(),
                    _ => "places unavailable".to_string(),
                };
                self.journal
                    .warn(
                        "countries.fallback",
                        format!("Using fallback country list: {reason}"),
                        json!({ "reason": reason }),
                    )
                    .await;
                FALLBACK_COUNTRIES.iter().map(|name| name.to_string()).collect()
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}
