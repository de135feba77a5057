//! Open-Meteo weather client: current conditions and archived daily history.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::instrument;

use crate::geocode::{Geocoder, GeocoderBackend, NOMINATIM_URL, OPEN_METEO_GEOCODING_URL};
use crate::retry::{status_error, with_retry, RetryConfig};
use crate::types::{
    normalize_city, validate_city_name, CurrentConditions, DailyRecord, DateRange,
    WeatherCondition, WeatherError,
};

pub const OPEN_METEO_FORECAST_URL: &str = "https://api.open-meteo.com";
pub const OPEN_METEO_ARCHIVE_URL: &str = "https://archive-api.open-meteo.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_USER_AGENT: &str = concat!("nimbus/", env!("CARGO_PKG_VERSION"));

/// Base URLs for every remote service the provider talks to
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub forecast_url: String,
    pub archive_url: String,
    pub geocoding_url: String,
    pub nominatim_url: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            forecast_url: OPEN_METEO_FORECAST_URL.to_string(),
            archive_url: OPEN_METEO_ARCHIVE_URL.to_string(),
            geocoding_url: OPEN_METEO_GEOCODING_URL.to_string(),
            nominatim_url: NOMINATIM_URL.to_string(),
        }
    }
}

impl ProviderEndpoints {
    /// Point every endpoint at one server (used against mock servers).
    pub fn single(base_url: &str) -> Self {
        Self {
            forecast_url: base_url.to_string(),
            archive_url: base_url.to_string(),
            geocoding_url: base_url.to_string(),
            nominatim_url: base_url.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: Option<ForecastCurrent>,
}

#[derive(Debug, Deserialize)]
struct ForecastCurrent {
    temperature_2m: Option<f64>,
    #[serde(default)]
    apparent_temperature: Option<f64>,
    #[serde(default)]
    relative_humidity_2m: Option<f64>,
    #[serde(default)]
    wind_speed_10m: Option<f64>,
    #[serde(default)]
    weather_code: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    daily: Option<ArchiveDaily>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ArchiveDaily {
    time: Vec<String>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_mean: Vec<Option<f64>>,
    #[serde(default)]
    weather_code: Vec<Option<f64>>,
}

/// Weather data client with geocoding fallback and retry
#[derive(Debug, Clone)]
pub struct WeatherProvider {
    client: Client,
    endpoints: ProviderEndpoints,
    retry: RetryConfig,
    geocoder: Arc<Geocoder>,
}

impl WeatherProvider {
    pub fn new(
        endpoints: ProviderEndpoints,
        retry: RetryConfig,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        let geocoder = Geocoder::new(
            client.clone(),
            vec![
                GeocoderBackend::open_meteo(endpoints.geocoding_url.as_str()),
                GeocoderBackend::nominatim(endpoints.nominatim_url.as_str()),
            ],
            retry.clone(),
        );

        Ok(Self {
            client,
            endpoints,
            retry,
            geocoder: Arc::new(geocoder),
        })
    }

    pub fn with_defaults() -> Result<Self, WeatherError> {
        Self::new(
            ProviderEndpoints::default(),
            RetryConfig::default(),
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            DEFAULT_USER_AGENT,
        )
    }

    pub fn geocoder(&self) -> &Geocoder {
        &self.geocoder
    }

    /// Fetch current conditions for `city`.
    #[instrument(skip(self), level = "info")]
    pub async fn fetch_current(&self, city: &str) -> Result<CurrentConditions, WeatherError> {
        let city = validate_city_name(city)?;
        let location = self.geocoder.geocode(&city).await?;

        let url = format!(
            "{}/v1/forecast?latitude={}&longitude={}\
             &current=temperature_2m,apparent_temperature,relative_humidity_2m,wind_speed_10m,weather_code\
             &timezone=auto",
            self.endpoints.forecast_url.trim_end_matches('/'),
            location.latitude,
            location.longitude
        );
        let body: ForecastResponse = self.get_json("forecast", &url).await?;
        let current = body
            .current
            .ok_or_else(|| WeatherError::Parse("forecast response has no current block".into()))?;
        let temperature = current
            .temperature_2m
            .ok_or_else(|| WeatherError::Parse("current temperature missing".into()))?;

        Ok(CurrentConditions {
            city: normalize_city(&city),
            display_name: location.display_name,
            temperature,
            feels_like: current.apparent_temperature.unwrap_or(temperature),
            humidity: current
                .relative_humidity_2m
                .map(|h| h.clamp(0.0, 100.0).round() as u8)
                .unwrap_or(0),
            wind_speed: current.wind_speed_10m.unwrap_or(0.0),
            condition: current
                .weather_code
                .map(|c| WeatherCondition::from_wmo_code(c as i32))
                .unwrap_or_default(),
            observed_at: Utc::now(),
        })
    }

    /// Fetch archived daily aggregates for `city` over `range`, oldest first.
    #[instrument(skip(self), level = "info")]
    pub async fn fetch_history(
        &self,
        city: &str,
        range: DateRange,
    ) -> Result<Vec<DailyRecord>, WeatherError> {
        let city = validate_city_name(city)?;
        let location = self.geocoder.geocode(&city).await?;

        let url = format!(
            "{}/v1/archive?latitude={}&longitude={}&start_date={}&end_date={}\
             &daily=temperature_2m_max,temperature_2m_min,temperature_2m_mean,weather_code\
             &timezone=auto",
            self.endpoints.archive_url.trim_end_matches('/'),
            location.latitude,
            location.longitude,
            range.start,
            range.end
        );
        let body: ArchiveResponse = self.get_json("archive", &url).await?;
        let daily = body
            .daily
            .ok_or_else(|| WeatherError::Parse("archive response has no daily block".into()))?;

        let records = records_from_daily(&city, daily)?;
        tracing::info!("Fetched {} history days for {} ({})", records.len(), city, range);
        Ok(records)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        label: &str,
        url: &str,
    ) -> Result<T, WeatherError> {
        let client = &self.client;
        with_retry(&self.retry, label, move || async move {
            let response = client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(status_error(status, body.chars().take(200).collect::<String>()));
            }
            Ok(response.json::<T>().await?)
        })
        .await
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Turn the column-oriented archive payload into records.
///
/// A day with no mean uses (max + min) / 2; a day with neither is skipped.
pub(crate) fn records_from_daily(
    city: &str,
    daily: ArchiveDaily,
) -> Result<Vec<DailyRecord>, WeatherError> {
    let n = daily.time.len();
    let column_ok = |len: usize, optional: bool| len == n || (optional && len == 0);
    if !column_ok(daily.temperature_2m_max.len(), false)
        || !column_ok(daily.temperature_2m_min.len(), false)
        || !column_ok(daily.temperature_2m_mean.len(), true)
        || !column_ok(daily.weather_code.len(), true)
    {
        return Err(WeatherError::Parse(format!(
            "archive columns have mismatched lengths (expected {})",
            n
        )));
    }

    let mut records = Vec::with_capacity(n);
    for (i, day) in daily.time.iter().enumerate() {
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map_err(|e| WeatherError::Parse(format!("bad archive date {:?}: {}", day, e)))?;
        let max = daily.temperature_2m_max[i];
        let min = daily.temperature_2m_min[i];
        let mean = daily.temperature_2m_mean.get(i).copied().flatten();

        let avg = match (mean, max, min) {
            (Some(mean), _, _) => mean,
            (None, Some(max), Some(min)) => round2((max + min) / 2.0),
            _ => {
                tracing::debug!("Skipping {} for {}: no temperature data", date, city);
                continue;
            }
        };

        let condition = daily
            .weather_code
            .get(i)
            .copied()
            .flatten()
            .map(|c| WeatherCondition::from_wmo_code(c as i32))
            .unwrap_or_default();

        records.push(DailyRecord::new(
            city,
            date,
            max.unwrap_or(avg),
            min.unwrap_or(avg),
            avg,
            condition.description(),
        ));
    }

    records.sort_by_key(|r| r.date);
    Ok(records)
}
