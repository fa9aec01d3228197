use std::collections::HashSet;

use serde::{Deserialize, Serialize};

pub const UNKNOWN_STATION_NAME: &str = "Unknown Station";

/// A validated, playable stream. Two stations are the same station when they
/// share a name and a stream URL; the country label is informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    #[serde(rename = "streamUrl")]
    pub stream_url: String,
    #[serde(rename = "countryLabel")]
    pub country_label: String,
}

impl Station {
    pub fn new(
        name: impl Into<String>,
        stream_url: impl Into<String>,
        country_label: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            stream_url: stream_url.into(),
            country_label: country_label.into(),
        }
    }

    fn identity(&self) -> (&str, &str) {
        (&self.name, &self.stream_url)
    }
}

impl PartialEq for Station {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Station {}

impl std::hash::Hash for Station {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

/// Drops repeated stations, keeping the first occurrence.
pub fn dedupe_stations(stations: Vec<Station>) -> Vec<Station> {
    let mut seen = HashSet::new();
    stations
        .into_iter()
        .filter(|station| seen.insert(station.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_country_label() {
        let a = Station::new("Jazz FM", "https://x/1", "United States");
        let b = Station::new("Jazz FM", "https://x/1", "Canada");
        let c = Station::new("Jazz FM", "https://x/2", "United States");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn dedupe_keeps_first_occurrence_order() {
        let stations = vec![
            Station::new("A", "https://x/a", "Spain"),
            Station::new("B", "https://x/b", "Spain"),
            Station::new("A", "https://x/a", "Portugal"),
        ];
        let deduped = dedupe_stations(stations);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].country_label, "Spain");
        assert_eq!(deduped[1].name, "B");
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let station = Station::new("A", "https://x/a", "Spain");
        let value = serde_json::to_value(&station).unwrap();
        assert_eq!(value["streamUrl"], "https://x/a");
        assert_eq!(value["countryLabel"], "Spain");
    }
}
