//! Plain-text rendering for the CLI.
//!
//! Everything arrives in Celsius and is converted here, at the edge. These
//! functions only format; they never touch the store or the service.

use std::fmt::Write;

use nimbus_core::AppError;
use nimbus_weather::units::format_temperature;
use nimbus_weather::{
    AccuracySummary, CurrentConditions, DailyRecord, DataSource, Fetched, HistorySummary,
    PredictionResult, SearchReport, StoreStats, TemperatureUnit,
};

const STALE_NOTICE: &str = "Offline: showing last known data.";

/// "new york" -> "New York"
pub fn title_case(city: &str) -> String {
    city.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn temperature(celsius: f64, unit: TemperatureUnit) -> String {
    format_temperature(Some(celsius), unit)
}

/// A temperature difference (no offset, only scale).
pub fn temperature_delta(celsius: f64, unit: TemperatureUnit) -> String {
    let value = match unit {
        TemperatureUnit::Fahrenheit => celsius * 9.0 / 5.0,
        TemperatureUnit::Celsius | TemperatureUnit::Auto => celsius,
    };
    format!("{:.1} {}", value, unit.symbol())
}

pub fn source_label(source: DataSource) -> &'static str {
    match source {
        DataSource::Live => "live",
        DataSource::Cache => "cached",
        DataSource::Stale => "last known",
    }
}

fn confidence_label(confidence: f64) -> &'static str {
    if confidence >= 70.0 {
        "high"
    } else if confidence >= 40.0 {
        "medium"
    } else {
        "low"
    }
}

pub fn current(fetched: &Fetched<CurrentConditions>, unit: TemperatureUnit, icon: &str) -> String {
    let c = &fetched.data;
    let name = c
        .display_name
        .clone()
        .unwrap_or_else(|| title_case(&c.city));

    let mut out = String::new();
    if fetched.source.is_stale() {
        let _ = writeln!(out, "{}", STALE_NOTICE);
    }
    let _ = writeln!(out, "{} {}", icon, name);
    let _ = writeln!(
        out,
        "  {} (feels like {}), {}",
        temperature(c.temperature, unit),
        temperature(c.feels_like, unit),
        c.condition.description()
    );
    let _ = writeln!(
        out,
        "  Humidity {}%, wind {:.1} km/h, observed {}",
        c.humidity,
        c.wind_speed,
        c.observed_at.format("%Y-%m-%d %H:%M UTC")
    );
    out
}

pub fn history(records: &[DailyRecord], source: DataSource, unit: TemperatureUnit) -> String {
    let mut out = String::new();
    if source.is_stale() {
        let _ = writeln!(out, "{}", STALE_NOTICE);
    }
    if records.is_empty() {
        let _ = writeln!(out, "No history stored.");
        return out;
    }

    let _ = writeln!(
        out,
        "{:<12} {:>10} {:>10} {:>10}  {}",
        "Date", "High", "Low", "Average", "Condition"
    );
    for r in records {
        let _ = writeln!(
            out,
            "{:<12} {:>10} {:>10} {:>10}  {}",
            r.date.to_string(),
            temperature(r.temperature_max, unit),
            temperature(r.temperature_min, unit),
            temperature(r.temperature_avg, unit),
            r.condition
        );
    }
    let _ = writeln!(out, "({} days, {})", records.len(), source_label(source));
    if let Some(s) = HistorySummary::from_records(&records[0].city, records) {
        out.push_str(&summary(&s, unit));
    }
    out
}

pub fn summary(s: &HistorySummary, unit: TemperatureUnit) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Averages: high {}, low {}, mean {}",
        temperature(s.avg_high, unit),
        temperature(s.avg_low, unit),
        temperature(s.avg_mean, unit)
    );
    let _ = writeln!(
        out,
        "Hottest {} ({}), coldest {} ({}), range {}",
        s.hottest.date,
        temperature(s.hottest.temperature, unit),
        s.coldest.date,
        temperature(s.coldest.temperature, unit),
        temperature_delta(s.range, unit)
    );
    let _ = writeln!(
        out,
        "Trend {}, data {} ({} days)",
        s.trend.map_or("unknown", |t| t.label()),
        s.quality.label(),
        s.days
    );
    out
}

pub fn prediction(p: &PredictionResult, unit: TemperatureUnit) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Tomorrow ({}): {}, {} confidence ({:.0}%)",
        p.target_date,
        temperature(p.temperature, unit),
        confidence_label(p.confidence),
        p.confidence
    );
    let _ = writeln!(
        out,
        "  Based on {} day(s); trend {}, consistency {:.0}%",
        p.sample_count,
        p.trend.label(),
        p.consistency * 100.0
    );
    let _ = writeln!(
        out,
        "  Data quality {} ({} missing day(s)). {}",
        p.quality.label(),
        p.missing_days,
        p.quality.recommendation()
    );
    out
}

pub fn accuracy(a: &AccuracySummary, unit: TemperatureUnit) -> String {
    match (a.mean_absolute_error, a.within_tolerance_pct) {
        (Some(mae), Some(pct)) => format!(
            "Accuracy: {} checked, {} pending; average error {}, {:.0}% within ±{}\n",
            a.resolved,
            a.pending,
            temperature_delta(mae, unit),
            pct,
            temperature_delta(a.tolerance, unit)
        ),
        _ if a.pending > 0 => format!(
            "Accuracy: {} prediction(s) waiting for the actual temperature\n",
            a.pending
        ),
        _ => "Accuracy: no predictions yet\n".to_string(),
    }
}

/// Full search output
pub fn report(
    report: &SearchReport,
    unit: TemperatureUnit,
    icon_for: impl Fn(&CurrentConditions) -> String,
) -> String {
    let mut out = String::new();
    match &report.current {
        Some(c) => out.push_str(&current(c, unit, &icon_for(&c.data))),
        None => {
            let _ = writeln!(out, "{}: current conditions unavailable", title_case(&report.city));
        }
    }
    out.push('\n');
    out.push_str(&history(&report.history.data, report.history.source, unit));
    out.push('\n');
    match &report.prediction {
        Some(p) => out.push_str(&prediction(p, unit)),
        None => out.push_str("Prediction unavailable: no history for this city yet.\n"),
    }
    out.push_str(&accuracy(&report.accuracy, unit));
    out
}

pub fn cities(cities: &[String]) -> String {
    if cities.is_empty() {
        return "No cities searched yet.\n".to_string();
    }
    cities
        .iter()
        .map(|c| format!("{}\n", title_case(c)))
        .collect()
}

pub fn stats(s: &StoreStats, unit: TemperatureUnit) -> String {
    if s.records == 0 {
        return "No weather history stored.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "Records:     {} across {} cities", s.records, s.cities);
    let _ = writeln!(out, "Predictions: {}", s.predictions);
    if let (Some(first), Some(last)) = (s.first_date, s.last_date) {
        let _ = writeln!(out, "Dates:       {} to {}", first, last);
    }
    let _ = writeln!(
        out,
        "Lowest:      {}",
        format_temperature(s.min_temperature, unit)
    );
    let _ = writeln!(
        out,
        "Highest:     {}",
        format_temperature(s.max_temperature, unit)
    );
    let _ = writeln!(
        out,
        "Mean:        {}",
        format_temperature(s.mean_temperature, unit)
    );
    out
}

/// One line for stderr: the friendly message plus the detail.
pub fn error_line(error: &AppError) -> String {
    format!("{} ({})", error.user_message(), error)
}
