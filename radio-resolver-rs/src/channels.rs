use serde_json::json;

use crate::{
    directory::{ChannelRef, DirectoryClient, DirectoryError, Fetch, Place},
    journal::Journal,
    matcher::country_label,
};

/// Fetches the channel list of a single place. Pacing between places is the
/// caller's business.
#[derive(Clone)]
pub struct ChannelResolver {
    directory: DirectoryClient,
    journal: Journal,
}

impl ChannelResolver {
    pub fn new(directory: DirectoryClient, journal: Journal) -> Self {
        Self { directory, journal }
    }

    /// Channels for `place`; an unreachable place yields an empty list.
    pub async fn resolve_channels(&self, place: &Place) -> Result<Vec<ChannelRef>, DirectoryError> {
        let label = country_label(place);
        match self.directory.fetch_channels(&place.id).await? {
            Fetch::Ready(channels) => {
                self.journal
                    .info(
                        "channels.fetched",
                        format!("Channels for {label}: {} items", channels.len()),
                        json!({ "placeId": place.id, "country": label, "count": channels.len() }),
                    )
                    .await;
                Ok(channels)
            }
            Fetch::Unavailable => {
                self.journal
                    .warn(
                        "channels.unavailable",
                        format!("Failed to fetch channels for {label}"),
                        json!({ "placeId": place.id, "country": label }),
                    )
                    .await;
                Ok(Vec::new())
            }
        }
    }
}
