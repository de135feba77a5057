pub mod app;
pub mod config;
pub mod error;
pub mod icon;

pub use app::{App, Preferences};
pub use config::{
    Config, NetworkConfig, StorageConfig, Theme, UiConfig, ValidationResult, WeatherConfig,
};
pub use error::{AppError, ConfigError, DatabaseError, NetworkError};
pub use icon::{IconChain, IconProvider};

use anyhow::Result;

/// Initialize logging.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (e.g. "info") applies.
pub fn init(default_level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    tracing::debug!("Nimbus core initialized");
    Ok(())
}
