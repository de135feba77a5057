use anyhow::{Context, Result};
use nimbus_weather::provider::{
    DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT, OPEN_METEO_ARCHIVE_URL, OPEN_METEO_FORECAST_URL,
};
use nimbus_weather::geocode::{NOMINATIM_URL, OPEN_METEO_GEOCODING_URL};
use nimbus_weather::retry::{DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_MS};
use nimbus_weather::{PredictorParams, ProviderEndpoints, RetryConfig, TemperatureUnit};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Prefix for environment overrides, e.g. `NIMBUS__WEATHER__HISTORY_DAYS=14`
pub const ENV_PREFIX: &str = "NIMBUS";
const ENV_SEPARATOR: &str = "__";
const APP_DIR: &str = "nimbus";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub weather: WeatherConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    /// Prediction constants
    #[serde(default)]
    pub predictor: PredictorParams,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Temperature unit preference
    pub temperature_unit: TemperatureUnit,

    /// Days of history fetched per search
    pub history_days: u32,

    /// Age after which a cached history entry is refetched
    pub cache_ttl_minutes: u64,

    /// Maximum number of (city, range) entries kept in memory
    pub cache_max_entries: usize,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            temperature_unit: TemperatureUnit::Auto,
            history_days: 7,
            cache_ttl_minutes: 60,
            cache_max_entries: 64,
        }
    }
}

impl WeatherConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes.saturating_mul(60))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub forecast_url: String,
    pub archive_url: String,
    pub geocoding_url: String,
    pub nominatim_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Attempts per request, including the first
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,

    /// Sent with every request (Nominatim requires one)
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            forecast_url: OPEN_METEO_FORECAST_URL.to_string(),
            archive_url: OPEN_METEO_ARCHIVE_URL.to_string(),
            geocoding_url: OPEN_METEO_GEOCODING_URL.to_string(),
            nominatim_url: NOMINATIM_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl NetworkConfig {
    pub fn endpoints(&self) -> ProviderEndpoints {
        ProviderEndpoints {
            forecast_url: self.forecast_url.clone(),
            archive_url: self.archive_url.clone(),
            geocoding_url: self.geocoding_url.clone(),
            nominatim_url: self.nominatim_url.clone(),
        }
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig::new(self.max_attempts, self.initial_delay_ms, self.max_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// History database; defaults to `<data dir>/nimbus/history.db`
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn effective_database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("history.db")
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    System,
    Light,
    Dark,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub theme: Theme,

    /// Language code for labels, e.g. "en"
    pub language: String,

    /// Background weather animations
    pub animations: bool,

    /// Show the map panel
    pub show_map: bool,

    /// Base URL of a remote icon set; unset means local glyphs only
    pub icon_base_url: Option<String>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            language: "en".to_string(),
            animations: true,
            show_map: true,
            icon_base_url: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from `path` with `NIMBUS__*` environment overrides.
    ///
    /// A missing file is not an error; every value falls back to its default.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::build(path, None)
    }

    fn build(path: &Path, env: Option<config::Map<String, String>>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to parse config file")?;
        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        for (field, url) in [
            ("network.forecast_url", &self.network.forecast_url),
            ("network.archive_url", &self.network.archive_url),
            ("network.geocoding_url", &self.network.geocoding_url),
            ("network.nominatim_url", &self.network.nominatim_url),
        ] {
            validate_url(url, field, &mut result);
        }

        let weather = &self.weather;
        if weather.history_days == 0 {
            result.add_error("weather.history_days", "History window must be at least 1 day");
        } else if weather.history_days > 92 {
            result.add_warning(
                "weather.history_days",
                "History window is longer than 3 months; searches will be slow",
            );
        }
        if weather.cache_ttl_minutes == 0 {
            result.add_warning(
                "weather.cache_ttl_minutes",
                "Cache disabled for ranges that include today (0 minutes)",
            );
        } else if weather.cache_ttl_minutes > 1440 {
            result.add_warning(
                "weather.cache_ttl_minutes",
                "Cache entries live for more than 24 hours",
            );
        }
        if weather.cache_max_entries == 0 {
            result.add_error("weather.cache_max_entries", "Cache must hold at least 1 entry");
        }

        let network = &self.network;
        if network.timeout_secs == 0 {
            result.add_error("network.timeout_secs", "Timeout must be greater than 0");
        }
        if network.max_attempts == 0 {
            result.add_error("network.max_attempts", "At least 1 attempt is required");
        } else if network.max_attempts > 10 {
            result.add_warning("network.max_attempts", "More than 10 attempts per request");
        }
        if network.initial_delay_ms > network.max_delay_ms {
            result.add_warning(
                "network.initial_delay_ms",
                "Initial retry delay is larger than the maximum delay",
            );
        }
        if network.user_agent.trim().is_empty() {
            result.add_error("network.user_agent", "User agent cannot be empty");
        }

        let predictor = &self.predictor;
        if predictor.window_days == 0 {
            result.add_error("predictor.window_days", "Window must be at least 1 day");
        }
        if !(0.0..=100.0).contains(&predictor.max_confidence) {
            result.add_error("predictor.max_confidence", "Must be between 0 and 100");
        }
        if predictor.per_day_bonus < 0.0 || predictor.variance_penalty < 0.0 {
            result.add_error(
                "predictor",
                "per_day_bonus and variance_penalty cannot be negative",
            );
        }
        if predictor.low_sample_cap > predictor.max_confidence {
            result.add_warning(
                "predictor.low_sample_cap",
                "Low-sample cap is above max_confidence and has no effect",
            );
        }
        if predictor.accuracy_tolerance <= 0.0 {
            result.add_error(
                "predictor.accuracy_tolerance",
                "Tolerance must be greater than 0",
            );
        }
        if predictor.window_days < self.weather.history_days as usize {
            result.add_warning(
                "predictor.window_days",
                "Predictor looks at fewer days than each search fetches",
            );
        }

        if self.ui.language.trim().is_empty() {
            result.add_warning("ui.language", "No language set, using English");
        }
        if let Some(base) = &self.ui.icon_base_url {
            validate_url(base, "ui.icon_base_url", &mut result);
        }

        result
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join(APP_DIR);

        Ok(config_dir.join("config.toml"))
    }
}

/// Validate a URL field
fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
    match Url::parse(url_str) {
        Ok(url) => {
            if url.scheme() != "http" && url.scheme() != "https" {
                result.add_error(
                    field_name,
                    format!("URL must use http or https scheme, got: {}", url.scheme()),
                );
            }
            if url.host().is_none() {
                result.add_error(field_name, "URL must have a host");
            }
            if url.port() == Some(0) {
                result.add_error(field_name, "Port cannot be 0");
            }
        }
        Err(e) => {
            result.add_error(field_name, format!("Invalid URL: {}", e));
        }
    }
}
