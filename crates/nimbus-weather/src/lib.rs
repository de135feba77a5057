//! Weather history and prediction core for Nimbus
//!
//! Fetches current and archived weather from Open-Meteo, keeps a durable
//! per-city history in SQLite with an in-memory cache in front, and projects
//! the recent days into a next-day estimate with a confidence score.

pub mod types;
pub mod units;
pub mod retry;
pub mod geocode;
pub mod provider;
pub mod cache;
pub mod store;
pub mod predictor;
pub mod service;
pub mod session;

pub use types::*;
pub use cache::{CacheStats, HistoryCache};
pub use geocode::{Geocoder, GeocoderBackend};
pub use predictor::{
    AccuracySummary, PredictionQuality, PredictionResult, Predictor, PredictorParams, Trend,
};
pub use provider::{ProviderEndpoints, WeatherProvider};
pub use retry::RetryConfig;
pub use service::{DataSource, Fetched, SearchReport, WeatherService};
pub use session::{SearchMessage, SearchSession, SessionState};
pub use store::{DataQuality, DayExtreme, HistoryStore, HistorySummary, StoreStats};
pub use units::TemperatureUnit;
