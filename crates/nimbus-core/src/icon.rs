//! Weather icon lookup with ordered fallback.
//!
//! Providers are asked in order; the first that has an icon for a condition
//! wins. The default chain is remote icon set (when configured), then text
//! glyphs, then emoji.

use nimbus_weather::WeatherCondition;

/// Icon source for weather conditions
pub trait IconProvider: Send + Sync {
    /// Identifier used in logs
    fn name(&self) -> &str;

    /// Icon for `condition`, or None if this provider has nothing for it
    fn icon(&self, condition: WeatherCondition) -> Option<String>;
}

/// Icons served from a remote icon set: `<base>/<icon_name>.png`
pub struct RemoteIconProvider {
    base_url: String,
}

impl RemoteIconProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl IconProvider for RemoteIconProvider {
    fn name(&self) -> &str {
        "remote"
    }

    fn icon(&self, condition: WeatherCondition) -> Option<String> {
        if self.base_url.is_empty() {
            return None;
        }
        Some(format!("{}/{}.png", self.base_url, condition.icon_name()))
    }
}

/// Single-width text symbols. Not every condition has one.
pub struct GlyphIconProvider;

impl IconProvider for GlyphIconProvider {
    fn name(&self) -> &str {
        "glyph"
    }

    fn icon(&self, condition: WeatherCondition) -> Option<String> {
        let glyph = match condition {
            WeatherCondition::Clear => "☀",
            WeatherCondition::Cloudy => "☁",
            WeatherCondition::Rain | WeatherCondition::HeavyRain | WeatherCondition::Drizzle => {
                "☂"
            }
            WeatherCondition::Snow => "❄",
            WeatherCondition::Thunderstorm => "⚡",
            WeatherCondition::PartlyCloudy | WeatherCondition::Fog | WeatherCondition::Sleet => {
                return None
            }
        };
        Some(glyph.to_string())
    }
}

/// Emoji for every condition; the end of the chain.
pub struct EmojiIconProvider;

impl IconProvider for EmojiIconProvider {
    fn name(&self) -> &str {
        "emoji"
    }

    fn icon(&self, condition: WeatherCondition) -> Option<String> {
        let emoji = match condition {
            WeatherCondition::Clear => "☀️",
            WeatherCondition::PartlyCloudy => "⛅",
            WeatherCondition::Cloudy => "☁️",
            WeatherCondition::Fog => "🌫️",
            WeatherCondition::Drizzle => "🌦️",
            WeatherCondition::Rain => "🌧️",
            WeatherCondition::HeavyRain => "⛈️",
            WeatherCondition::Snow => "🌨️",
            WeatherCondition::Sleet => "🌨️",
            WeatherCondition::Thunderstorm => "🌩️",
        };
        Some(emoji.to_string())
    }
}

/// Ordered list of icon providers
pub struct IconChain {
    providers: Vec<Box<dyn IconProvider>>,
}

impl IconChain {
    pub fn new(providers: Vec<Box<dyn IconProvider>>) -> Self {
        Self { providers }
    }

    /// Remote set first when a base URL is configured, then glyphs, then emoji.
    pub fn standard(remote_base_url: Option<&str>) -> Self {
        let mut providers: Vec<Box<dyn IconProvider>> = Vec::new();
        if let Some(base) = remote_base_url {
            providers.push(Box::new(RemoteIconProvider::new(base)));
        }
        providers.push(Box::new(GlyphIconProvider));
        providers.push(Box::new(EmojiIconProvider));
        Self::new(providers)
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// First icon any provider has; the condition's icon key if none do.
    pub fn resolve(&self, condition: WeatherCondition) -> String {
        for provider in &self.providers {
            if let Some(icon) = provider.icon(condition) {
                return icon;
            }
            tracing::debug!("{} icon provider has nothing for {:?}", provider.name(), condition);
        }
        condition.icon_name().to_string()
    }
}

impl Default for IconChain {
    fn default() -> Self {
        Self::standard(None)
    }
}

impl std::fmt::Debug for IconChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.provider_names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_first_when_configured() {
        let chain = IconChain::standard(Some("https://icons.example.com/set/"));
        assert_eq!(chain.provider_names(), vec!["remote", "glyph", "emoji"]);
        assert_eq!(
            chain.resolve(WeatherCondition::Rain),
            "https://icons.example.com/set/cloud_rain.png"
        );
    }

    #[test]
    fn test_glyph_then_emoji() {
        let chain = IconChain::default();
        assert_eq!(chain.resolve(WeatherCondition::Snow), "❄");
        // No glyph for fog
        assert_eq!(chain.resolve(WeatherCondition::Fog), "🌫️");
    }

    #[test]
    fn test_empty_chain_falls_back_to_icon_name() {
        let chain = IconChain::new(Vec::new());
        assert_eq!(chain.resolve(WeatherCondition::Thunderstorm), "cloud_lightning");
    }

    #[test]
    fn test_blank_remote_base_is_skipped() {
        let chain = IconChain::standard(Some(""));
        assert_eq!(chain.resolve(WeatherCondition::Clear), "☀");
    }
}
