mod models;

pub use models::{dedupe_stations, Station, UNKNOWN_STATION_NAME};
