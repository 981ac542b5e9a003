//! Server configuration from environment.

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_path: String,
    pub database_max_connections: u32,
    pub modem_csv_path: String,
    /// Google elevation API key. Elevation lookups are skipped when unset.
    pub elevation_api_key: Option<String>,
    /// Satellite count a point must exceed to be trusted.
    pub min_satellites: u32,
    pub min_altitude_m: f64,
    pub max_altitude_m: f64,
    /// Hours after its last point a flight still absorbs cross-midnight points.
    pub contiguity_window_hrs: i64,
    /// Hours a flight stays in the active list after its last point.
    pub active_window_hrs: i64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server_port: env::var("STRATO_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3000),
            database_path: env::var("STRATO_DATABASE_PATH")
                .unwrap_or_else(|_| "data/strato.db".to_string()),
            database_max_connections: env::var("STRATO_DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            modem_csv_path: env::var("STRATO_MODEM_CSV")
                .unwrap_or_else(|_| "modems.csv".to_string()),
            elevation_api_key: env::var("GOOGLE_MAPS_API_KEY").ok(),
            min_satellites: env::var("STRATO_MIN_SATELLITES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(6),
            min_altitude_m: env::var("STRATO_MIN_ALTITUDE_M")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(-86.0),
            max_altitude_m: env::var("STRATO_MAX_ALTITUDE_M")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60_000.0),
            contiguity_window_hrs: env::var("STRATO_CONTIG_FLIGHT_DELTA_HRS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            active_window_hrs: env::var("STRATO_ACTIVE_FLIGHT_DELTA_HRS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(12),
        }
    }
}
