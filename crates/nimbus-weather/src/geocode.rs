//! Forward geocoding: convert a city name to coordinates.
//!
//! Open-Meteo's geocoding search is tried first, Nominatim (OpenStreetMap)
//! second. Both are free and need no API key.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;

use crate::retry::{status_error, with_retry, RetryConfig};
use crate::types::{normalize_city, GeoLocation, WeatherError};

pub const OPEN_METEO_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com";
pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
const GEOCODE_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const GEOCODE_CACHE_MAX: usize = 256;

#[derive(Debug, Deserialize)]
struct OpenMeteoSearchResponse {
    #[serde(default)]
    results: Vec<OpenMeteoPlace>,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoPlace {
    name: String,
    latitude: f64,
    longitude: f64,
    country: Option<String>,
    admin1: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: Option<String>,
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    county: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

impl NominatimAddress {
    /// "Seattle, Washington" style name; falls back through smaller places.
    fn place_name(self) -> Option<String> {
        let place = self
            .city
            .or(self.town)
            .or(self.village)
            .or(self.municipality)
            .or(self.county)?;
        Some(with_region(place, self.state.or(self.country)))
    }
}

/// Append a region for disambiguation when it differs from the place.
fn with_region(place: String, region: Option<String>) -> String {
    match region {
        Some(r) if !r.is_empty() && r != place => format!("{}, {}", place, r),
        _ => place,
    }
}

/// One geocoding service in the fallback chain
#[derive(Debug, Clone)]
pub enum GeocoderBackend {
    OpenMeteo { base_url: String },
    Nominatim { base_url: String },
}

impl GeocoderBackend {
    pub fn open_meteo(base_url: impl Into<String>) -> Self {
        Self::OpenMeteo {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn nominatim(base_url: impl Into<String>) -> Self {
        Self::Nominatim {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenMeteo { .. } => "open-meteo geocoder",
            Self::Nominatim { .. } => "nominatim geocoder",
        }
    }

    async fn lookup(&self, client: &Client, city: &str) -> Result<GeoLocation, WeatherError> {
        match self {
            Self::OpenMeteo { base_url } => {
                let url = format!(
                    "{}/v1/search?name={}&count=1&language=en&format=json",
                    base_url,
                    urlencoding::encode(city)
                );
                let response = client.get(&url).send().await?;
                if !response.status().is_success() {
                    return Err(status_error(response.status(), "geocoding search failed"));
                }
                let body: OpenMeteoSearchResponse = response.json().await?;
                let place = body
                    .results
                    .into_iter()
                    .next()
                    .ok_or_else(|| WeatherError::NotFound(city.to_string()))?;
                let display = with_region(place.name, place.admin1.or(place.country));
                GeoLocation::new(place.latitude, place.longitude, Some(display))
            }
            Self::Nominatim { base_url } => {
                let url = format!(
                    "{}/search?q={}&format=json&limit=1&addressdetails=1",
                    base_url,
                    urlencoding::encode(city)
                );
                let response = client.get(&url).send().await?;
                if !response.status().is_success() {
                    return Err(status_error(response.status(), "nominatim search failed"));
                }
                let places: Vec<NominatimPlace> = response.json().await?;
                let place = places
                    .into_iter()
                    .next()
                    .ok_or_else(|| WeatherError::NotFound(city.to_string()))?;

                let latitude = place.lat.parse::<f64>().map_err(|e| {
                    WeatherError::Parse(format!("bad latitude {:?}: {}", place.lat, e))
                })?;
                let longitude = place.lon.parse::<f64>().map_err(|e| {
                    WeatherError::Parse(format!("bad longitude {:?}: {}", place.lon, e))
                })?;
                let display = place
                    .address
                    .and_then(NominatimAddress::place_name)
                    .or(place.display_name);
                GeoLocation::new(latitude, longitude, display)
            }
        }
    }
}

/// Geocoder with ordered fallback and a 24h memo of successful lookups.
#[derive(Debug)]
pub struct Geocoder {
    client: Client,
    backends: Vec<GeocoderBackend>,
    retry: RetryConfig,
    cache: Mutex<HashMap<String, (GeoLocation, Instant)>>,
}

impl Geocoder {
    pub fn new(client: Client, backends: Vec<GeocoderBackend>, retry: RetryConfig) -> Self {
        Self {
            client,
            backends,
            retry,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Open-Meteo first, Nominatim second, public endpoints.
    pub fn with_defaults(client: Client, retry: RetryConfig) -> Self {
        Self::new(
            client,
            vec![
                GeocoderBackend::open_meteo(OPEN_METEO_GEOCODING_URL),
                GeocoderBackend::nominatim(NOMINATIM_URL),
            ],
            retry,
        )
    }

    /// Resolve `city` to coordinates.
    ///
    /// Each backend gets its own retry budget. `NotFound` is only returned when
    /// every backend answered "no match"; otherwise the first real failure wins.
    pub async fn geocode(&self, city: &str) -> Result<GeoLocation, WeatherError> {
        let key = normalize_city(city);
        if let Some(hit) = self.cached(&key) {
            tracing::debug!("Geocode cache hit for {}", key);
            return Ok(hit);
        }

        let client = &self.client;
        let mut failure: Option<WeatherError> = None;
        for backend in &self.backends {
            let result =
                with_retry(&self.retry, backend.name(), move || backend.lookup(client, city))
                    .await;
            match result {
                Ok(location) => {
                    tracing::info!(
                        "Geocoded {} to {:.4}, {:.4} via {}",
                        city,
                        location.latitude,
                        location.longitude,
                        backend.name()
                    );
                    self.remember(key, location.clone(), Instant::now());
                    return Ok(location);
                }
                Err(WeatherError::NotFound(_)) => {
                    tracing::debug!("{} found no match for {}", backend.name(), city);
                }
                Err(e) => {
                    tracing::warn!("{} failed for {}: {}", backend.name(), city, e);
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }

        Err(failure.unwrap_or_else(|| WeatherError::NotFound(city.to_string())))
    }

    fn cached(&self, key: &str) -> Option<GeoLocation> {
        let mut cache = self.cache.lock();
        match cache.get(key) {
            Some((location, at)) if at.elapsed() < GEOCODE_CACHE_TTL => Some(location.clone()),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    /// Memoize a lookup. Expired entries go first; if the memo is still
    /// full the oldest lookup is evicted.
    fn remember(&self, key: String, location: GeoLocation, at: Instant) {
        let mut cache = self.cache.lock();
        if !cache.contains_key(&key) && cache.len() >= GEOCODE_CACHE_MAX {
            cache.retain(|_, (_, stored)| {
                at.saturating_duration_since(*stored) < GEOCODE_CACHE_TTL
            });
            if cache.len() >= GEOCODE_CACHE_MAX {
                let oldest = cache
                    .iter()
                    .min_by_key(|(_, (_, stored))| *stored)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    cache.remove(&oldest);
                }
            }
        }
        cache.insert(key, (location, at));
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}
