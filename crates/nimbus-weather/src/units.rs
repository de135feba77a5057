//! Temperature unit conversion for display.
//!
//! Everything stored or computed is Celsius. These helpers only run at the
//! display boundary, so they never fail: missing or non-numeric input comes
//! back as `None`, which renders as "N/A".

use serde::{Deserialize, Serialize};

const KELVIN_OFFSET: f64 = 273.15;

/// Temperature unit preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Auto,
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Resolve `Auto` against a locale string such as `en_US.UTF-8`.
    ///
    /// Only the US and a few territories use Fahrenheit day to day.
    pub fn resolve(self, locale: Option<&str>) -> Self {
        match self {
            Self::Auto => {
                let region = locale
                    .and_then(|l| l.split('.').next())
                    .and_then(|l| l.split(['_', '-']).nth(1))
                    .map(str::to_ascii_uppercase);
                match region.as_deref() {
                    Some("US" | "LR" | "BS" | "BZ" | "KY" | "PW") => Self::Fahrenheit,
                    _ => Self::Celsius,
                }
            }
            unit => unit,
        }
    }

    /// Switch between Celsius and Fahrenheit (Auto becomes Fahrenheit).
    pub fn toggle(self) -> Self {
        match self {
            Self::Fahrenheit => Self::Celsius,
            Self::Celsius | Self::Auto => Self::Fahrenheit,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Fahrenheit => "°F",
            Self::Celsius | Self::Auto => "°C",
        }
    }

    /// Convert a canonical Celsius value into this unit.
    pub fn from_celsius(self, celsius: Option<f64>) -> Option<f64> {
        match self {
            Self::Fahrenheit => celsius_to_fahrenheit(celsius),
            Self::Celsius | Self::Auto => valid(celsius).map(round1),
        }
    }
}

fn valid(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn kelvin_to_celsius(kelvin: Option<f64>) -> Option<f64> {
    valid(kelvin).map(|k| round1(k - KELVIN_OFFSET))
}

pub fn kelvin_to_fahrenheit(kelvin: Option<f64>) -> Option<f64> {
    valid(kelvin).map(|k| round1((k - KELVIN_OFFSET) * 9.0 / 5.0 + 32.0))
}

pub fn celsius_to_fahrenheit(celsius: Option<f64>) -> Option<f64> {
    valid(celsius).map(|c| round1(c * 9.0 / 5.0 + 32.0))
}

pub fn fahrenheit_to_celsius(fahrenheit: Option<f64>) -> Option<f64> {
    valid(fahrenheit).map(|f| round1((f - 32.0) * 5.0 / 9.0))
}

/// Parse user or file input; anything non-numeric is unavailable.
pub fn parse_temperature(raw: &str) -> Option<f64> {
    valid(raw.trim().parse::<f64>().ok())
}

/// Render a Celsius value in the requested unit, e.g. `"21.5 °C"` or `"N/A"`.
pub fn format_temperature(celsius: Option<f64>, unit: TemperatureUnit) -> String {
    match unit.from_celsius(celsius) {
        Some(value) => format!("{:.1} {}", value, unit.symbol()),
        None => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kelvin_conversions() {
        assert_eq!(kelvin_to_celsius(Some(273.15)), Some(0.0));
        assert_eq!(kelvin_to_celsius(Some(300.0)), Some(26.9));
        assert_eq!(kelvin_to_fahrenheit(Some(273.15)), Some(32.0));
        assert_eq!(kelvin_to_fahrenheit(Some(310.15)), Some(98.6));
    }

    #[test]
    fn test_celsius_fahrenheit() {
        assert_eq!(celsius_to_fahrenheit(Some(100.0)), Some(212.0));
        assert_eq!(celsius_to_fahrenheit(Some(-40.0)), Some(-40.0));
        assert_eq!(fahrenheit_to_celsius(Some(212.0)), Some(100.0));
        assert_eq!(fahrenheit_to_celsius(Some(70.0)), Some(21.1));
    }

    #[test]
    fn test_unavailable_inputs() {
        assert_eq!(kelvin_to_celsius(None), None);
        assert_eq!(celsius_to_fahrenheit(Some(f64::NAN)), None);
        assert_eq!(fahrenheit_to_celsius(Some(f64::INFINITY)), None);
        assert_eq!(parse_temperature("N/A"), None);
        assert_eq!(parse_temperature(" 21.5 "), Some(21.5));
    }

    #[test]
    fn test_fahrenheit_round_trip_within_tolerance() {
        let mut t = -60.0;
        while t <= 60.0 {
            let back = fahrenheit_to_celsius(celsius_to_fahrenheit(Some(t)));
            let back = back.unwrap_or(f64::NAN);
            assert!((back - t).abs() <= 0.1 + 1e-9, "{} came back as {}", t, back);
            t += 0.37;
        }
    }

    #[test]
    fn test_unit_resolution() {
        assert_eq!(
            TemperatureUnit::Auto.resolve(Some("en_US.UTF-8")),
            TemperatureUnit::Fahrenheit
        );
        assert_eq!(
            TemperatureUnit::Auto.resolve(Some("en_GB.UTF-8")),
            TemperatureUnit::Celsius
        );
        assert_eq!(TemperatureUnit::Auto.resolve(None), TemperatureUnit::Celsius);
        assert_eq!(
            TemperatureUnit::Celsius.resolve(Some("en_US")),
            TemperatureUnit::Celsius
        );
    }

    #[test]
    fn test_toggle_and_format() {
        assert_eq!(TemperatureUnit::Celsius.toggle(), TemperatureUnit::Fahrenheit);
        assert_eq!(TemperatureUnit::Fahrenheit.toggle(), TemperatureUnit::Celsius);
        assert_eq!(format_temperature(Some(21.54), TemperatureUnit::Celsius), "21.5 °C");
        assert_eq!(format_temperature(Some(0.0), TemperatureUnit::Fahrenheit), "32.0 °F");
        assert_eq!(format_temperature(None, TemperatureUnit::Celsius), "N/A");
    }
}
