use anyhow::Result;
use nimbus_weather::{TemperatureUnit, WeatherCondition};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{Config, Theme, ValidationResult};
use crate::icon::IconChain;

/// User-adjustable display settings, seeded from the config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    pub unit: TemperatureUnit,
    pub theme: Theme,
    pub language: String,
    pub animations: bool,
    pub show_map: bool,
}

impl Preferences {
    fn from_config(config: &Config) -> Self {
        Self {
            unit: config.weather.temperature_unit,
            theme: config.ui.theme,
            language: config.ui.language.clone(),
            animations: config.ui.animations,
            show_map: config.ui.show_map,
        }
    }
}

/// Application context handed to the front end.
///
/// Owns configuration, the current preferences and the icon chain. Nothing
/// here is global; the weather core never sees it.
pub struct App {
    config: Arc<Config>,
    preferences: RwLock<Preferences>,
    icons: IconChain,
}

impl App {
    /// Load and validate configuration, then build the context
    pub fn new() -> Result<Self> {
        let (config, validation) = Config::load_validated()?;
        tracing::info!(
            "Configuration loaded ({} warning(s))",
            validation.warnings.len()
        );
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        let icons = IconChain::standard(config.ui.icon_base_url.as_deref());
        let preferences = RwLock::new(Preferences::from_config(&config));
        Self {
            config: Arc::new(config),
            preferences,
            icons,
        }
    }

    /// Get reference to application config
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn validate(&self) -> ValidationResult {
        self.config.validate()
    }

    pub fn preferences(&self) -> Preferences {
        self.preferences.read().clone()
    }

    pub fn set_unit(&self, unit: TemperatureUnit) {
        self.preferences.write().unit = unit;
    }

    /// Flip between Celsius and Fahrenheit and return the new unit
    pub fn toggle_unit(&self) -> TemperatureUnit {
        let mut prefs = self.preferences.write();
        prefs.unit = prefs.unit.toggle();
        prefs.unit
    }

    /// Display unit with `Auto` resolved against the process locale
    pub fn display_unit(&self) -> TemperatureUnit {
        let locale = ["LC_ALL", "LC_MEASUREMENT", "LANG"]
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()));
        self.preferences.read().unit.resolve(locale.as_deref())
    }

    pub fn icon_for(&self, condition: WeatherCondition) -> String {
        self.icons.resolve(condition)
    }

    pub fn icons(&self) -> &IconChain {
        &self.icons
    }

    pub fn database_path(&self) -> PathBuf {
        self.config.storage.effective_database_path()
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("preferences", &*self.preferences.read())
            .field("icons", &self.icons)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_seeded_from_config() {
        let mut config = Config::default();
        config.weather.temperature_unit = TemperatureUnit::Celsius;
        config.ui.animations = false;
        let app = App::from_config(config);

        let prefs = app.preferences();
        assert_eq!(prefs.unit, TemperatureUnit::Celsius);
        assert!(!prefs.animations);
        assert_eq!(prefs.language, "en");
    }

    #[test]
    fn test_toggle_unit_changes_preferences_only() {
        let mut config = Config::default();
        config.weather.temperature_unit = TemperatureUnit::Celsius;
        let app = App::from_config(config);

        assert_eq!(app.toggle_unit(), TemperatureUnit::Fahrenheit);
        assert_eq!(app.preferences().unit, TemperatureUnit::Fahrenheit);
        assert_eq!(app.config().weather.temperature_unit, TemperatureUnit::Celsius);

        app.set_unit(TemperatureUnit::Celsius);
        assert_eq!(app.display_unit(), TemperatureUnit::Celsius);
    }

    #[test]
    fn test_icon_chain_from_config() {
        let mut config = Config::default();
        config.ui.icon_base_url = Some("https://icons.example.com".into());
        let app = App::from_config(config);
        assert_eq!(
            app.icon_for(WeatherCondition::Clear),
            "https://icons.example.com/sun.png"
        );
    }

    #[test]
    fn test_configured_database_path() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/tmp/nimbus-test/history.db"));
        let app = App::from_config(config);
        assert_eq!(app.database_path(), PathBuf::from("/tmp/nimbus-test/history.db"));
    }
}
