use serde::Deserialize;
use serde_json::Value;

use crate::stations::UNKNOWN_STATION_NAME;

/// A geographic location from the places listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Place {
    pub id: String,
    pub title: Option<String>,
    pub country_name: String,
    pub country_code: String,
}

/// A station entry on a place page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub title: String,
    pub station_page_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct PlacesEnvelope {
    data: Option<PlacesData>,
}

#[derive(Debug, Default, Deserialize)]
struct PlacesData {
    list: Option<Vec<RawPlace>>,
}

#[derive(Debug, Deserialize)]
struct RawPlace {
    id: Option<String>,
    title: Option<String>,
    country: Option<String>,
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelsEnvelope {
    data: Option<ChannelsData>,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelsData {
    content: Option<Vec<ChannelSection>>,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelSection {
    items: Option<Vec<RawChannel>>,
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    title: Option<String>,
    page: Option<RawPage>,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    id: Option<String>,
}

/// `{"data": {"list": [...]}}`. Missing levels read as an empty page; entries
/// without an id are dropped.
pub(crate) fn decode_places(body: Value) -> Result<Vec<Place>, serde_json::Error> {
    let envelope: PlacesEnvelope = serde_json::from_value(body)?;
    let raw = envelope.data.and_then(|data| data.list).unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|entry| {
            let id = entry.id?.trim().to_string();
            if id.is_empty() {
                return None;
            }
            Some(Place {
                id,
                title: entry.title,
                country_name: entry.country.unwrap_or_default().trim().to_string(),
                country_code: entry.country_code.unwrap_or_default().trim().to_string(),
            })
        })
        .collect())
}

/// `{"data": {"content": [{"items": [...]}]}}`. Only the first section lists
/// the place's own stations.
pub(crate) fn decode_channels(body: Value) -> Result<Vec<ChannelRef>, serde_json::Error> {
    let envelope: ChannelsEnvelope = serde_json::from_value(body)?;
    let items = envelope
        .data
        .and_then(|data| data.content)
        .and_then(|sections| sections.into_iter().next())
        .and_then(|section| section.items)
        .unwrap_or_default();
    Ok(items
        .into_iter()
        .filter_map(|item| {
            let station_page_id = item.page?.id?.trim().to_string();
            if station_page_id.is_empty() {
                return None;
            }
            let title = item
                .title
                .map(|title| title.trim().to_string())
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| UNKNOWN_STATION_NAME.to_string());
            Some(ChannelRef {
                title,
                station_page_id,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn places_without_id_are_skipped() {
        let body = json!({"data": {"list": [
            {"id": "a1", "title": "Austin", "country": "United States", "countryCode": "US"},
            {"title": "Nowhere", "country": "Atlantis"},
            {"id": "  ", "country": "Blank"}
        ]}});
        let places = decode_places(body).unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].country_code, "US");
        assert_eq!(places[0].title.as_deref(), Some("Austin"));
    }

    #[test]
    fn missing_list_is_an_empty_page() {
        assert!(decode_places(json!({})).unwrap().is_empty());
        assert!(decode_places(json!({"data": null})).unwrap().is_empty());
    }

    #[test]
    fn wrong_shape_is_an_error() {
        assert!(decode_places(json!({"data": {"list": "nope"}})).is_err());
        assert!(decode_places(json!([1, 2, 3])).is_err());
    }

    #[test]
    fn channels_use_first_section_and_default_title() {
        let body = json!({"data": {"content": [
            {"items": [
                {"title": "Radio One", "page": {"id": "r1"}},
                {"page": {"id": "r2"}},
                {"title": "No page"}
            ]},
            {"items": [{"title": "Nearby", "page": {"id": "n1"}}]}
        ]}});
        let channels = decode_channels(body).unwrap();
        assert_eq!(
            channels,
            vec![
                ChannelRef {
                    title: "Radio One".into(),
                    station_page_id: "r1".into()
                },
                ChannelRef {
                    title: UNKNOWN_STATION_NAME.into(),
                    station_page_id: "r2".into()
                },
            ]
        );
    }

    #[test]
    fn empty_content_yields_no_channels() {
        assert!(decode_channels(json!({"data": {"content": []}}))
            .unwrap()
            .is_empty());
    }
}
