//! Ground elevation lookups via the Google elevation API.
//!
//! Results are cached per exact coordinate pair so a client polling the same
//! descending balloon doesn't burn API quota. Lookups are an annotation on
//! update responses, so every failure degrades to "no elevation".

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Deserialize;

const CACHE_LIMIT: usize = 100;
const ENDPOINT: &str = "https://maps.googleapis.com/maps/api/elevation/json";

#[derive(Deserialize)]
struct ElevationResponse {
    results: Vec<ElevationResult>,
}

#[derive(Deserialize)]
struct ElevationResult {
    elevation: f64,
}

struct CacheEntry {
    lat: f64,
    lng: f64,
    elevation: f64,
}

pub struct ElevationClient {
    http: reqwest::Client,
    api_key: Option<String>,
    cache: Mutex<VecDeque<CacheEntry>>,
}

impl ElevationClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            cache: Mutex::new(VecDeque::new()),
        }
    }

    /// Elevation in meters under the given coordinates, or `None` when the
    /// API key is unset, the request fails, or the API returns no results.
    pub async fn ground_elevation(&self, lat: f64, lng: f64) -> Option<f64> {
        let key = self.api_key.as_deref()?;

        if let Ok(cache) = self.cache.lock() {
            if let Some(entry) = cache.iter().find(|e| e.lat == lat && e.lng == lng) {
                return Some(entry.elevation);
            }
        }

        let response = self
            .http
            .get(ENDPOINT)
            .query(&[
                ("locations", format!("{lat},{lng}")),
                ("key", key.to_string()),
            ])
            .send()
            .await;
        let parsed: ElevationResponse = match response {
            Ok(response) => match response.json().await {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::warn!("Elevation response unreadable: {err}");
                    return None;
                }
            },
            Err(err) => {
                tracing::warn!("Elevation request failed: {err}");
                return None;
            }
        };

        let elevation = parsed.results.first()?.elevation;
        if let Ok(mut cache) = self.cache.lock() {
            cache.push_back(CacheEntry {
                lat,
                lng,
                elevation,
            });
            if cache.len() > CACHE_LIMIT {
                cache.pop_front();
            }
        }
        Some(elevation)
    }
}
