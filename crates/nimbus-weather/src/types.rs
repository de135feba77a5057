use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Weather condition categories mapped from WMO codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    #[default]
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    HeavyRain,
    Snow,
    Sleet,
    Thunderstorm,
}

impl WeatherCondition {
    const ALL: [WeatherCondition; 10] = [
        Self::Clear,
        Self::PartlyCloudy,
        Self::Cloudy,
        Self::Fog,
        Self::Drizzle,
        Self::Rain,
        Self::HeavyRain,
        Self::Snow,
        Self::Sleet,
        Self::Thunderstorm,
    ];

    /// Convert WMO weather code to WeatherCondition
    /// See: https://open-meteo.com/en/docs#weathervariables
    pub fn from_wmo_code(code: i32) -> Self {
        match code {
            0 => Self::Clear,
            1..=2 => Self::PartlyCloudy,
            3 => Self::Cloudy,
            45 | 48 => Self::Fog,
            51 | 53 | 55 => Self::Drizzle,
            56 | 57 => Self::Sleet, // Freezing drizzle
            61 | 63 | 80 => Self::Rain,
            65 | 81 | 82 => Self::HeavyRain,
            66 | 67 => Self::Sleet, // Freezing rain
            71 | 73 | 75 | 77 | 85 | 86 => Self::Snow,
            95 | 96 | 99 => Self::Thunderstorm,
            _ => Self::Clear,
        }
    }

    /// Short label stored with each daily record
    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartlyCloudy => "Partly Cloudy",
            Self::Cloudy => "Cloudy",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::HeavyRain => "Heavy Rain",
            Self::Snow => "Snow",
            Self::Sleet => "Sleet",
            Self::Thunderstorm => "Thunderstorm",
        }
    }

    /// Reverse of [`description`](Self::description), case-insensitive.
    pub fn from_description(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.description().eq_ignore_ascii_case(label))
    }

    /// Icon key used by the icon provider chain
    pub fn icon_name(&self) -> &'static str {
        match self {
            Self::Clear => "sun",
            Self::PartlyCloudy => "cloud_sun",
            Self::Cloudy => "cloud",
            Self::Fog => "cloud_fog",
            Self::Drizzle | Self::Rain | Self::HeavyRain => "cloud_rain",
            Self::Snow | Self::Sleet => "cloud_snow",
            Self::Thunderstorm => "cloud_lightning",
        }
    }
}

/// Geographic location a city name resolved to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub display_name: Option<String>,
}

impl GeoLocation {
    /// Build a location, rejecting coordinates outside the valid ranges.
    pub fn new(
        latitude: f64,
        longitude: f64,
        display_name: Option<String>,
    ) -> Result<Self, WeatherError> {
        if !Self::is_valid(latitude, longitude) {
            return Err(WeatherError::Parse(format!(
                "coordinates out of range: {}, {}",
                latitude, longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
            display_name,
        })
    }

    pub fn is_valid(latitude: f64, longitude: f64) -> bool {
        (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
    }
}

/// Current weather conditions for a city (Celsius)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub city: String,
    pub display_name: Option<String>,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: u8,
    pub wind_speed: f64,
    pub condition: WeatherCondition,
    pub observed_at: DateTime<Utc>,
}

/// One day's aggregated weather for one city. Temperatures are Celsius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub city: String,
    pub date: NaiveDate,
    pub temperature_max: f64,
    pub temperature_min: f64,
    pub temperature_avg: f64,
    pub condition: String,
}

impl DailyRecord {
    /// Create a record, normalizing the city key.
    pub fn new(
        city: &str,
        date: NaiveDate,
        temperature_max: f64,
        temperature_min: f64,
        temperature_avg: f64,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            city: normalize_city(city),
            date,
            temperature_max,
            temperature_min,
            temperature_avg,
            condition: condition.into(),
        }
    }
}

/// A stored next-day forecast plus its later-resolved outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub city: String,
    pub target_date: NaiveDate,
    pub predicted_temperature: f64,
    pub confidence: f64,
    pub actual_temperature: Option<f64>,
}

impl PredictionRecord {
    pub fn is_resolved(&self) -> bool {
        self.actual_temperature.is_some()
    }

    /// |predicted - actual|, once the actual value is known.
    pub fn absolute_error(&self) -> Option<f64> {
        self.actual_temperature
            .map(|actual| (self.predicted_temperature - actual).abs())
    }
}

/// Inclusive range of calendar dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Build a range; the endpoints are swapped if given in reverse order.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// The `days` fully elapsed days ending yesterday.
    ///
    /// The archive provider has nothing for today, so the window stops one day short.
    pub fn trailing(today: NaiveDate, days: u32) -> Self {
        let days = i64::from(days.max(1));
        let end = today - Duration::days(1);
        let start = end - Duration::days(days - 1);
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of days covered, inclusive of both ends.
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Normalized key for a city name: trimmed, single-spaced, lowercase.
pub fn normalize_city(city: &str) -> String {
    city.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

const MIN_CITY_LEN: usize = 2;
const MAX_CITY_LEN: usize = 100;

/// Check that a city name is reasonable to send to a geocoder.
///
/// Returns the trimmed name. Letters from any script are allowed, plus spaces
/// and `-'.,` (covers "St. John's", "Winston-Salem", "São Paulo").
pub fn validate_city_name(city: &str) -> Result<String, WeatherError> {
    let trimmed = city.trim();
    if trimmed.is_empty() {
        return Err(WeatherError::InvalidCity(
            "City name cannot be empty".to_string(),
        ));
    }

    let len = trimmed.chars().count();
    if len < MIN_CITY_LEN {
        return Err(WeatherError::InvalidCity(format!(
            "City name must be at least {} characters long",
            MIN_CITY_LEN
        )));
    }
    if len > MAX_CITY_LEN {
        return Err(WeatherError::InvalidCity("City name is too long".to_string()));
    }

    let allowed = |c: char| c.is_alphabetic() || c.is_whitespace() || "-'.,".contains(c);
    if !trimmed.chars().all(allowed) {
        return Err(WeatherError::InvalidCity(format!(
            "City name contains invalid characters: {}",
            trimmed
        )));
    }

    Ok(trimmed.to_string())
}

/// Weather subsystem errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WeatherError {
    #[error("City not found: {0}")]
    NotFound(String),
    #[error("Temporary failure: {0}")]
    Transient(String),
    #[error("Not enough history to predict for {0}")]
    InsufficientData(String),
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
    #[error("Invalid city name: {0}")]
    InvalidCity(String),
    #[error("Provider rejected request: {status} - {message}")]
    Provider { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl WeatherError {
    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "City not found. Check the spelling and try again.",
            Self::Transient(_) => "Weather service is unreachable. Showing last known data.",
            Self::InsufficientData(_) => "Prediction unavailable: no history for this city yet.",
            Self::CorruptRecord(_) => "Some saved weather data could not be read.",
            Self::InvalidCity(_) => "Please enter a valid city name.",
            Self::Provider { .. } => "The weather service rejected the request.",
            Self::Parse(_) => "Received unexpected weather data.",
            Self::Storage(_) => "Local weather history is unavailable.",
        }
    }
}

impl From<rusqlite::Error> for WeatherError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
