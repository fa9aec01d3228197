use std::collections::HashMap;

use serde::Serialize;
use serde_json::json;
use url::Url;

use crate::{
    directory::{ChannelRef, DirectoryClient, DirectoryError, TransportError},
    journal::Journal,
    stations::Station,
};

/// Liveness check for candidate streams. One HEAD per channel, no retries.
#[derive(Clone)]
pub struct StreamValidator {
    directory: DirectoryClient,
    journal: Journal,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ValidationSummary {
    pub accepted: usize,
    pub dropped: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub reasons: HashMap<String, i32>,
}

impl StreamValidator {
    pub fn new(directory: DirectoryClient, journal: Journal) -> Self {
        Self { directory, journal }
    }

    /// A station when the channel's stream answers 200, otherwise `None`.
    pub async fn validate(
        &self,
        channel: &ChannelRef,
        country_label: &str,
    ) -> Result<Option<Station>, DirectoryError> {
        let stream_url = self.directory.stream_url(&channel.station_page_id)?;
        Ok(self.check(channel, &stream_url, country_label).await.ok())
    }

    /// Validates `channels` in order, pushing live stations onto `accepted`
    /// until it holds `cap` entries. Channels left over once the cap is hit are
    /// not checked.
    pub async fn validate_into(
        &self,
        channels: &[ChannelRef],
        country_label: &str,
        accepted: &mut Vec<Station>,
        cap: usize,
    ) -> Result<ValidationSummary, DirectoryError> {
        let mut summary = ValidationSummary::default();
        for (idx, channel) in channels.iter().enumerate() {
            if accepted.len() >= cap {
                summary.skipped = channels.len() - idx;
                break;
            }
            let stream_url = self.directory.stream_url(&channel.station_page_id)?;
            let candidate = Station::new(&channel.title, stream_url.as_str(), country_label);
            if accepted.contains(&candidate) {
                summary.duplicates += 1;
                continue;
            }
            match self.check(channel, &stream_url, country_label).await {
                Ok(station) => {
                    accepted.push(station);
                    summary.accepted += 1;
                }
                Err(reason) => {
                    *summary.reasons.entry(reason).or_default() += 1;
                    summary.dropped += 1;
                }
            }
        }
        Ok(summary)
    }

    /// The live station, or the rejection reason.
    async fn check(
        &self,
        channel: &ChannelRef,
        stream_url: &Url,
        country_label: &str,
    ) -> Result<Station, String> {
        let outcome = match self.directory.head_check(stream_url).await {
            Ok(200) => Ok(()),
            Ok(status) => Err((format!("status-{status}"), format!("Status: {status}"))),
            Err(TransportError::Timeout) => Err(("timeout".to_string(), "timeout".to_string())),
            Err(TransportError::Status(status)) => {
                Err((format!("status-{status}"), format!("Status: {status}")))
            }
            Err(error) => Err(("network".to_string(), error.to_string())),
        };

        match outcome {
            Ok(()) => {
                self.journal
                    .info(
                        "stream.valid",
                        format!("Valid station: {} ({stream_url})", channel.title),
                        json!({ "station": channel.title, "url": stream_url.as_str() }),
                    )
                    .await;
                Ok(Station::new(
                    &channel.title,
                    stream_url.as_str(),
                    country_label,
                ))
            }
            Err((reason, detail)) => {
                self.journal
                    .info(
                        "stream.rejected",
                        format!("Invalid stream URL: {stream_url} ({detail})"),
                        json!({ "station": channel.title, "url": stream_url.as_str(), "reason": reason }),
                    )
                    .await;
                Err(reason)
            }
        }
    }
}
