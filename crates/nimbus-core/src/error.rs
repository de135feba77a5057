//! Centralized error types for the Nimbus application.
//!
//! Library crates return their own typed errors; this hierarchy is what the
//! front end sees, with `user_message()` giving a short actionable line.

use nimbus_weather::WeatherError;
use thiserror::Error;

/// Top-level application error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Weather error: {0}")]
    Weather(WeatherError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Database(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Weather(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }

    /// True when the failure is worth retrying later (connectivity, server load).
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Network(NetworkError::ServerError { status, .. }) => *status >= 500,
            AppError::Network(_) => true,
            _ => false,
        }
    }
}

/// Sort weather failures into the category the user cares about.
impl From<WeatherError> for AppError {
    fn from(e: WeatherError) -> Self {
        match e {
            WeatherError::Transient(message) => {
                AppError::Network(NetworkError::ConnectionFailed(message))
            }
            WeatherError::Provider { status, message } => {
                AppError::Network(NetworkError::ServerError { status, message })
            }
            WeatherError::Storage(message) => {
                AppError::Database(DatabaseError::QueryFailed(message))
            }
            WeatherError::CorruptRecord(message) => {
                AppError::Database(DatabaseError::Corruption(message))
            }
            other => AppError::Weather(other),
        }
    }
}

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => {
                "Unable to reach the weather service. Check your internet connection."
            }
            NetworkError::ServerError { status, .. } if *status >= 500 => {
                "The weather service is having issues. Please try again later."
            }
            NetworkError::ServerError { .. } => "The weather service rejected the request.",
        }
    }
}

/// Local history database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Data corruption detected: {0}")]
    Corruption(String),
}

impl DatabaseError {
    pub fn user_message(&self) -> &'static str {
        match self {
            DatabaseError::QueryFailed(_) => "Weather history could not be read or saved.",
            DatabaseError::Corruption(_) => {
                "Weather history may be corrupted. Consider clearing it."
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
        }
    }
}
