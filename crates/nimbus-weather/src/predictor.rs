//! Next-day temperature estimate from stored history.
//!
//! The estimate is a linearly weighted moving average over the most recent
//! days (oldest weight 1, newest weight n). Confidence grows with the number
//! of days and shrinks with their spread:
//!
//! `confidence = base + per_day_bonus * n - variance_penalty * stddev`
//!
//! clamped to `[0, max_confidence]`, and to `low_sample_cap` when fewer than
//! two days are available.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::store::HistoryStore;
use crate::types::{normalize_city, DailyRecord, PredictionRecord, WeatherError};

/// Tunable predictor constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorParams {
    /// Days of history the estimate looks at
    pub window_days: usize,
    pub base_confidence: f64,
    pub per_day_bonus: f64,
    /// Confidence lost per °C of standard deviation
    pub variance_penalty: f64,
    pub max_confidence: f64,
    /// Ceiling applied when fewer than two days are known
    pub low_sample_cap: f64,
    /// A resolved prediction within this many °C counts as accurate
    pub accuracy_tolerance: f64,
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            window_days: 7,
            base_confidence: 30.0,
            per_day_bonus: 10.0,
            variance_penalty: 8.0,
            max_confidence: 95.0,
            low_sample_cap: 30.0,
            accuracy_tolerance: 2.0,
        }
    }
}

/// Direction of the recent temperature trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

impl Trend {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rising => "rising",
            Self::Falling => "falling",
            Self::Stable => "stable",
        }
    }
}

/// How much history backs a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionQuality {
    /// Six or more days
    Excellent,
    /// Four or five
    Good,
    /// Two or three
    Fair,
    Poor,
}

impl PredictionQuality {
    pub fn from_days(days: usize) -> Self {
        match days {
            6.. => Self::Excellent,
            4..=5 => Self::Good,
            2..=3 => Self::Fair,
            _ => Self::Poor,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            Self::Excellent => "Predictions should be very reliable.",
            Self::Good => "Predictions should be reliable.",
            Self::Fair => "Predictions available but may be less accurate.",
            Self::Poor => "Insufficient data for reliable predictions.",
        }
    }
}

const TREND_THRESHOLD: f64 = 1.0;
/// Standard deviation (°C) at which consistency reaches zero
const CONSISTENCY_SPREAD: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub city: String,
    pub target_date: NaiveDate,
    /// Celsius, rounded to 0.1
    pub temperature: f64,
    /// Percent, 0..=100
    pub confidence: f64,
    pub sample_count: usize,
    pub trend: Trend,
    /// 0.0 (erratic) ..= 1.0 (flat)
    pub consistency: f64,
    pub quality: PredictionQuality,
    /// Days of the window with no usable record
    pub missing_days: usize,
}

impl PredictionResult {
    pub fn to_record(&self) -> PredictionRecord {
        PredictionRecord {
            city: self.city.clone(),
            target_date: self.target_date,
            predicted_temperature: self.temperature,
            confidence: self.confidence,
            actual_temperature: None,
        }
    }
}

/// How past predictions for a city turned out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracySummary {
    pub city: String,
    pub resolved: usize,
    pub pending: usize,
    pub mean_absolute_error: Option<f64>,
    pub within_tolerance_pct: Option<f64>,
    pub tolerance: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Predictor {
    params: PredictorParams,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn weighted_average(values: &[f64]) -> f64 {
    let (sum, weights) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sum, weights), (i, v)| {
            let w = (i + 1) as f64;
            (sum + v * w, weights + w)
        });
    if weights == 0.0 {
        0.0
    } else {
        sum / weights
    }
}

/// Newer half against older half, with a ±1 °C dead band.
pub(crate) fn trend_of(values: &[f64]) -> Trend {
    if values.len() < 2 {
        return Trend::Stable;
    }
    let (first, second) = values.split_at(values.len() / 2);
    let delta = mean(second) - mean(first);
    if delta > TREND_THRESHOLD {
        Trend::Rising
    } else if delta < -TREND_THRESHOLD {
        Trend::Falling
    } else {
        Trend::Stable
    }
}

impl Predictor {
    pub fn new(params: PredictorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PredictorParams {
        &self.params
    }

    /// Confidence for `n` days with the given spread.
    pub fn confidence(&self, n: usize, std_dev: f64) -> f64 {
        let p = &self.params;
        let raw = p.base_confidence + p.per_day_bonus * n as f64 - p.variance_penalty * std_dev;
        let mut confidence = raw.clamp(0.0, p.max_confidence.max(0.0));
        if n < 2 {
            confidence = confidence.min(p.low_sample_cap);
        }
        round_to(confidence, 1)
    }

    /// Estimate the day after the last of `records` (oldest first).
    ///
    /// Only the trailing `window_days` records are used.
    pub fn estimate(
        &self,
        city: &str,
        records: &[DailyRecord],
    ) -> Result<PredictionResult, WeatherError> {
        let window = self.params.window_days.max(1);
        let recent = &records[records.len().saturating_sub(window)..];
        let Some(last) = recent.last() else {
            return Err(WeatherError::InsufficientData(city.to_string()));
        };

        let temps: Vec<f64> = recent.iter().map(|r| r.temperature_avg).collect();
        let spread = std_dev(&temps);

        Ok(PredictionResult {
            city: normalize_city(city),
            target_date: last.date + Duration::days(1),
            temperature: round_to(weighted_average(&temps), 1),
            confidence: self.confidence(temps.len(), spread),
            sample_count: temps.len(),
            trend: trend_of(&temps),
            consistency: round_to((1.0 - spread / CONSISTENCY_SPREAD).max(0.0), 2),
            quality: PredictionQuality::from_days(temps.len()),
            missing_days: window.saturating_sub(temps.len()),
        })
    }

    /// Predict tomorrow for `city` from the store and record the prediction.
    pub fn predict(
        &self,
        store: &mut HistoryStore,
        city: &str,
    ) -> Result<PredictionResult, WeatherError> {
        let records = store.read_recent(city, self.params.window_days.max(1))?;
        let result = self.estimate(city, &records)?;
        store.append_prediction(&result.to_record())?;

        tracing::info!(
            "Predicted {:.1}°C for {} on {} ({:.0}% confidence, {} days, {})",
            result.temperature,
            result.city,
            result.target_date,
            result.confidence,
            result.sample_count,
            result.trend.label()
        );
        Ok(result)
    }

    pub fn accuracy(
        &self,
        store: &HistoryStore,
        city: &str,
    ) -> Result<AccuracySummary, WeatherError> {
        let predictions = store.predictions(city)?;
        let errors: Vec<f64> = predictions
            .iter()
            .filter_map(PredictionRecord::absolute_error)
            .collect();
        let tolerance = self.params.accuracy_tolerance;

        let (mean_absolute_error, within_tolerance_pct) = if errors.is_empty() {
            (None, None)
        } else {
            let hits = errors.iter().filter(|e| **e <= tolerance + 1e-9).count();
            (
                Some(round_to(mean(&errors), 2)),
                Some(round_to(hits as f64 * 100.0 / errors.len() as f64, 1)),
            )
        };

        Ok(AccuracySummary {
            city: normalize_city(city),
            resolved: errors.len(),
            pending: predictions.len() - errors.len(),
            mean_absolute_error,
            within_tolerance_pct,
            tolerance,
        })
    }
}
