//! SQLite-backed history store.
//!
//! Holds the durable weather history: one row per (city, date), the predictions
//! made for each city, and the last current-conditions snapshot. Rows that no
//! longer decode are logged and skipped so one bad row never hides the rest.

use std::path::Path;

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::predictor::{trend_of, Trend};
use crate::types::{
    normalize_city, CurrentConditions, DailyRecord, DateRange, PredictionRecord, WeatherError,
};

/// Aggregate figures over everything stored
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub records: usize,
    pub cities: usize,
    pub predictions: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub mean_temperature: Option<f64>,
}

/// Days needed before a summary counts as representative
const SUMMARY_GOOD_DAYS: usize = 5;
/// Fewer days than this and the summary reports no trend
const SUMMARY_TREND_DAYS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    Good,
    Limited,
}

impl DataQuality {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Limited => "limited",
        }
    }
}

/// One day picked out of a summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayExtreme {
    pub date: NaiveDate,
    pub temperature: f64,
}

/// Averages and extremes over a city's recent days, Celsius rounded to 0.1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub city: String,
    pub days: usize,
    pub avg_high: f64,
    pub avg_low: f64,
    pub avg_mean: f64,
    /// Highest daily maximum
    pub hottest: DayExtreme,
    /// Lowest daily minimum
    pub coldest: DayExtreme,
    /// Hottest maximum minus coldest minimum
    pub range: f64,
    /// None below four days
    pub trend: Option<Trend>,
    pub quality: DataQuality,
}

impl HistorySummary {
    /// Summarize `records` (oldest first). None when there are none.
    pub fn from_records(city: &str, records: &[DailyRecord]) -> Option<Self> {
        let first = records.first()?;
        let mut hottest = DayExtreme {
            date: first.date,
            temperature: first.temperature_max,
        };
        let mut coldest = DayExtreme {
            date: first.date,
            temperature: first.temperature_min,
        };
        for r in records {
            if r.temperature_max > hottest.temperature {
                hottest = DayExtreme {
                    date: r.date,
                    temperature: r.temperature_max,
                };
            }
            if r.temperature_min < coldest.temperature {
                coldest = DayExtreme {
                    date: r.date,
                    temperature: r.temperature_min,
                };
            }
        }

        let n = records.len() as f64;
        let average =
            |field: fn(&DailyRecord) -> f64| round1(records.iter().map(field).sum::<f64>() / n);
        let means: Vec<f64> = records.iter().map(|r| r.temperature_avg).collect();

        Some(Self {
            city: normalize_city(city),
            days: records.len(),
            avg_high: average(|r| r.temperature_max),
            avg_low: average(|r| r.temperature_min),
            avg_mean: average(|r| r.temperature_avg),
            range: round1(hottest.temperature - coldest.temperature),
            hottest,
            coldest,
            trend: (records.len() >= SUMMARY_TREND_DAYS).then(|| trend_of(&means)),
            quality: if records.len() >= SUMMARY_GOOD_DAYS {
                DataQuality::Good
            } else {
                DataQuality::Limited
            },
        })
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub struct HistoryStore {
    conn: Connection,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore").finish_non_exhaustive()
    }
}

impl HistoryStore {
    /// Open (or create) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WeatherError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    WeatherError::Storage(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        tracing::debug!("Opened history store at {}", path.display());
        Ok(store)
    }

    /// In-memory store, nothing survives the process.
    pub fn in_memory() -> Result<Self, WeatherError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), WeatherError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS daily_records (
                city TEXT NOT NULL,
                date TEXT NOT NULL,
                temperature_max REAL NOT NULL,
                temperature_min REAL NOT NULL,
                temperature_avg REAL NOT NULL,
                condition TEXT NOT NULL DEFAULT '',
                updated_at TEXT NOT NULL,
                PRIMARY KEY (city, date)
            );

            CREATE TABLE IF NOT EXISTS predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                city TEXT NOT NULL,
                target_date TEXT NOT NULL,
                predicted_temperature REAL NOT NULL,
                confidence REAL NOT NULL,
                actual_temperature REAL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS current_snapshots (
                city TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                observed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_predictions_city_target
                ON predictions(city, target_date);
            "#,
        )?;
        Ok(())
    }

    /// Insert a day, replacing any earlier row for the same (city, date).
    ///
    /// An unresolved prediction targeting that day is resolved in the same
    /// transaction and returned.
    pub fn append_or_replace(
        &mut self,
        record: &DailyRecord,
    ) -> Result<Option<PredictionRecord>, WeatherError> {
        let city = normalize_city(&record.city);
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO daily_records
                (city, date, temperature_max, temperature_min, temperature_avg,
                 condition, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(city, date) DO UPDATE SET
                temperature_max = excluded.temperature_max,
                temperature_min = excluded.temperature_min,
                temperature_avg = excluded.temperature_avg,
                condition = excluded.condition,
                updated_at = excluded.updated_at",
            params![
                city,
                record.date.to_string(),
                record.temperature_max,
                record.temperature_min,
                record.temperature_avg,
                record.condition,
                Utc::now().to_rfc3339(),
            ],
        )?;

        let resolved = resolve_in(&tx, &city, record.date, record.temperature_avg)?;
        tx.commit()?;

        if let Some(p) = &resolved {
            tracing::info!(
                "Resolved prediction for {} on {}: predicted {:.1}, actual {:.1}",
                p.city,
                p.target_date,
                p.predicted_temperature,
                record.temperature_avg
            );
        }
        Ok(resolved)
    }

    /// Store several days in one go, returning every prediction they resolved.
    pub fn append_all(
        &mut self,
        records: &[DailyRecord],
    ) -> Result<Vec<PredictionRecord>, WeatherError> {
        let mut resolved = Vec::new();
        for record in records {
            if let Some(p) = self.append_or_replace(record)? {
                resolved.push(p);
            }
        }
        Ok(resolved)
    }

    /// Up to `n` most recent days for `city`, oldest first.
    pub fn read_recent(&self, city: &str, n: usize) -> Result<Vec<DailyRecord>, WeatherError> {
        let city = normalize_city(city);
        let mut stmt = self.conn.prepare(
            "SELECT city, date, temperature_max, temperature_min, temperature_avg, condition
             FROM daily_records
             WHERE city = ?1
             ORDER BY date DESC",
        )?;
        let mut rows = stmt.query(params![city])?;

        let mut records = Vec::with_capacity(n);
        while records.len() < n {
            let Some(row) = rows.next()? else { break };
            if let Some(record) = decode_or_skip(row, daily_from_row) {
                records.push(record);
            }
        }
        records.reverse();
        Ok(records)
    }

    /// Every stored day for `city` inside `range`, oldest first.
    pub fn read_range(
        &self,
        city: &str,
        range: DateRange,
    ) -> Result<Vec<DailyRecord>, WeatherError> {
        let city = normalize_city(city);
        let mut stmt = self.conn.prepare(
            "SELECT city, date, temperature_max, temperature_min, temperature_avg, condition
             FROM daily_records
             WHERE city = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC",
        )?;
        let mut rows = stmt.query(params![city, range.start.to_string(), range.end.to_string()])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(record) = decode_or_skip(row, daily_from_row) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Record a prediction.
    ///
    /// A still-unresolved prediction for the same (city, target date) gets the
    /// new estimate. A resolved one is left untouched.
    pub fn append_prediction(
        &mut self,
        prediction: &PredictionRecord,
    ) -> Result<(), WeatherError> {
        let city = normalize_city(&prediction.city);
        let target = prediction.target_date.to_string();
        let tx = self.conn.transaction()?;

        let resolved_exists: bool = tx
            .query_row(
                "SELECT 1 FROM predictions
                 WHERE city = ?1 AND target_date = ?2 AND actual_temperature IS NOT NULL
                 LIMIT 1",
                params![city, target],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if resolved_exists {
            tracing::debug!(
                "Prediction for {} on {} already resolved, keeping it",
                city,
                target
            );
            return Ok(());
        }

        let updated = tx.execute(
            "UPDATE predictions
             SET predicted_temperature = ?3, confidence = ?4, created_at = ?5
             WHERE city = ?1 AND target_date = ?2 AND actual_temperature IS NULL",
            params![
                city,
                target,
                prediction.predicted_temperature,
                prediction.confidence,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if updated == 0 {
            tx.execute(
                "INSERT INTO predictions
                    (city, target_date, predicted_temperature, confidence,
                     actual_temperature, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    city,
                    target,
                    prediction.predicted_temperature,
                    prediction.confidence,
                    prediction.actual_temperature,
                    Utc::now().to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Fill in the observed temperature on the unresolved prediction for
    /// (city, date). Returns false when there was nothing to resolve.
    pub fn resolve_prediction(
        &mut self,
        city: &str,
        date: NaiveDate,
        actual: f64,
    ) -> Result<bool, WeatherError> {
        let city = normalize_city(city);
        let tx = self.conn.transaction()?;
        let resolved = resolve_in(&tx, &city, date, actual)?;
        tx.commit()?;
        Ok(resolved.is_some())
    }

    /// All predictions for `city`, ordered by target date.
    pub fn predictions(&self, city: &str) -> Result<Vec<PredictionRecord>, WeatherError> {
        let city = normalize_city(city);
        let mut stmt = self.conn.prepare(
            "SELECT city, target_date, predicted_temperature, confidence, actual_temperature
             FROM predictions
             WHERE city = ?1
             ORDER BY target_date ASC, id ASC",
        )?;
        let mut rows = stmt.query(params![city])?;

        let mut predictions = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(p) = decode_or_skip(row, prediction_from_row) {
                predictions.push(p);
            }
        }
        Ok(predictions)
    }

    /// Keep the latest current-conditions payload for a city.
    pub fn save_current(&self, current: &CurrentConditions) -> Result<(), WeatherError> {
        let payload = serde_json::to_string(current)
            .map_err(|e| WeatherError::Storage(format!("cannot encode snapshot: {}", e)))?;
        self.conn.execute(
            "INSERT INTO current_snapshots (city, payload, observed_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(city) DO UPDATE SET
                payload = excluded.payload,
                observed_at = excluded.observed_at",
            params![
                normalize_city(&current.city),
                payload,
                current.observed_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn latest_current(&self, city: &str) -> Result<Option<CurrentConditions>, WeatherError> {
        let city = normalize_city(city);
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM current_snapshots WHERE city = ?1",
                params![city],
                |row| row.get(0),
            )
            .optional()?;

        Ok(payload.and_then(|p| match serde_json::from_str(&p) {
            Ok(current) => Some(current),
            Err(e) => {
                tracing::warn!("Skipping unreadable snapshot for {}: {}", city, e);
                None
            }
        }))
    }

    /// Every city with stored history or a snapshot, sorted.
    pub fn cities(&self) -> Result<Vec<String>, WeatherError> {
        let mut stmt = self.conn.prepare(
            "SELECT city FROM daily_records
             UNION
             SELECT city FROM current_snapshots
             ORDER BY city",
        )?;
        let cities = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cities)
    }

    pub fn stats(&self) -> Result<StoreStats, WeatherError> {
        let mut stats = self.conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT city), MIN(date), MAX(date),
                    MIN(temperature_min), MAX(temperature_max), AVG(temperature_avg)
             FROM daily_records",
            [],
            |row| {
                let date = |i: usize| -> Option<NaiveDate> {
                    row.get::<_, Option<String>>(i)
                        .ok()
                        .flatten()
                        .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
                };
                let number = |i: usize| row.get::<_, Option<f64>>(i).ok().flatten();
                Ok(StoreStats {
                    records: row.get::<_, i64>(0)? as usize,
                    cities: row.get::<_, i64>(1)? as usize,
                    predictions: 0,
                    first_date: date(2),
                    last_date: date(3),
                    min_temperature: number(4),
                    max_temperature: number(5),
                    mean_temperature: number(6).map(round1),
                })
            },
        )?;
        let predictions: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM predictions", [], |row| row.get(0))?;
        stats.predictions = predictions as usize;
        Ok(stats)
    }

    /// Summary of the last `days` stored days for `city`, None if there are none.
    pub fn summary(
        &self,
        city: &str,
        days: usize,
    ) -> Result<Option<HistorySummary>, WeatherError> {
        let records = self.read_recent(city, days)?;
        Ok(HistorySummary::from_records(city, &records))
    }

    /// Delete stored days and snapshots. Predictions are kept: they are the
    /// record the accuracy figures are computed from.
    pub fn clear(&self) -> Result<(), WeatherError> {
        self.conn.execute_batch(
            "DELETE FROM daily_records;
             DELETE FROM current_snapshots;",
        )?;
        tracing::info!("Cleared weather history");
        Ok(())
    }
}

fn resolve_in(
    conn: &Connection,
    city: &str,
    date: NaiveDate,
    actual: f64,
) -> Result<Option<PredictionRecord>, WeatherError> {
    let target = date.to_string();
    let id: Option<i64> = conn
        .query_row(
            "SELECT id FROM predictions
             WHERE city = ?1 AND target_date = ?2 AND actual_temperature IS NULL
             ORDER BY id DESC LIMIT 1",
            params![city, target],
            |row| row.get(0),
        )
        .optional()?;
    let Some(id) = id else {
        return Ok(None);
    };

    conn.execute(
        "UPDATE predictions SET actual_temperature = ?2 WHERE id = ?1",
        params![id, actual],
    )?;
    let row = conn
        .query_row(
            "SELECT city, target_date, predicted_temperature, confidence, actual_temperature
             FROM predictions WHERE id = ?1",
            params![id],
            |row| Ok(prediction_from_row(row)),
        )
        .optional()?;

    match row {
        Some(Ok(p)) => Ok(Some(p)),
        Some(Err(e)) => {
            tracing::warn!("Resolved prediction {} is unreadable: {}", id, e);
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Decode a row, logging and dropping it when it is malformed.
fn decode_or_skip<T>(
    row: &Row<'_>,
    decode: fn(&Row<'_>) -> Result<T, WeatherError>,
) -> Option<T> {
    match decode(row) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Skipping stored row: {}", e);
            None
        }
    }
}

fn corrupt(column: &str, e: impl std::fmt::Display) -> WeatherError {
    WeatherError::CorruptRecord(format!("{}: {}", column, e))
}

fn date_column(row: &Row<'_>, idx: usize, column: &str) -> Result<NaiveDate, WeatherError> {
    let raw: String = row.get(idx).map_err(|e| corrupt(column, e))?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|e| corrupt(column, format!("{:?} ({})", raw, e)))
}

fn number_column(row: &Row<'_>, idx: usize, column: &str) -> Result<f64, WeatherError> {
    let value: f64 = row.get(idx).map_err(|e| corrupt(column, e))?;
    if !value.is_finite() {
        return Err(corrupt(column, "not a finite number"));
    }
    Ok(value)
}

fn daily_from_row(row: &Row<'_>) -> Result<DailyRecord, WeatherError> {
    let city: String = row.get(0).map_err(|e| corrupt("city", e))?;
    Ok(DailyRecord {
        city,
        date: date_column(row, 1, "date")?,
        temperature_max: number_column(row, 2, "temperature_max")?,
        temperature_min: number_column(row, 3, "temperature_min")?,
        temperature_avg: number_column(row, 4, "temperature_avg")?,
        condition: row.get::<_, Option<String>>(5).ok().flatten().unwrap_or_default(),
    })
}

fn prediction_from_row(row: &Row<'_>) -> Result<PredictionRecord, WeatherError> {
    let city: String = row.get(0).map_err(|e| corrupt("city", e))?;
    let actual_temperature: Option<f64> = row
        .get(4)
        .map_err(|e| corrupt("actual_temperature", e))?;
    Ok(PredictionRecord {
        city,
        target_date: date_column(row, 1, "target_date")?,
        predicted_temperature: number_column(row, 2, "predicted_temperature")?,
        confidence: number_column(row, 3, "confidence")?,
        actual_temperature,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::types::WeatherCondition;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn day(city: &str, d: u32, avg: f64) -> DailyRecord {
        DailyRecord::new(city, date(2025, 6, d), avg + 5.0, avg - 5.0, avg, "Clear")
    }

    fn prediction(city: &str, d: u32, temp: f64) -> PredictionRecord {
        PredictionRecord {
            city: city.to_string(),
            target_date: date(2025, 6, d),
            predicted_temperature: temp,
            confidence: 60.0,
            actual_temperature: None,
        }
    }

    #[test]
    fn test_round_trip_most_recent_last() {
        let mut store = HistoryStore::in_memory().unwrap();
        for d in [3, 1, 2, 5, 4] {
            store.append_or_replace(&day("Denver", d, 20.0 + d as f64)).unwrap();
        }

        let recent = store.read_recent("denver", 3).unwrap();
        let dates: Vec<u32> = recent.iter().map(|r| chrono::Datelike::day(&r.date)).collect();
        assert_eq!(dates, vec![3, 4, 5]);
        assert_eq!(recent[2], day("Denver", 5, 25.0));
    }

    #[test]
    fn test_same_key_write_replaces() {
        let mut store = HistoryStore::in_memory().unwrap();
        store.append_or_replace(&day("Denver", 1, 20.0)).unwrap();
        store.append_or_replace(&day("Denver", 1, 20.0)).unwrap();
        assert_eq!(store.read_recent("Denver", 10).unwrap().len(), 1);

        store.append_or_replace(&day("DENVER", 1, 22.5)).unwrap();
        let records = store.read_recent("Denver", 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].temperature_avg, 22.5);
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let mut store = HistoryStore::in_memory().unwrap();
        store.append_or_replace(&day("Denver", 1, 20.0)).unwrap();
        store.append_or_replace(&day("Denver", 2, 21.0)).unwrap();
        store
            .conn
            .execute(
                "INSERT INTO daily_records VALUES ('denver', 'not-a-date', 1.0, 1.0, 1.0, '', '')",
                [],
            )
            .unwrap();
        store
            .conn
            .execute(
                "INSERT INTO daily_records
                 VALUES ('denver', '2025-06-03', 'hot', 1.0, 'N/A', '', '')",
                [],
            )
            .unwrap();

        let records = store.read_recent("Denver", 7).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].temperature_avg, 21.0);
    }

    #[test]
    fn test_storing_target_day_resolves_prediction() {
        let mut store = HistoryStore::in_memory().unwrap();
        store.append_prediction(&prediction("Denver", 10, 19.0)).unwrap();

        let resolved = store
            .append_or_replace(&DailyRecord::new(
                "Denver",
                date(2025, 6, 10),
                24.0,
                12.4,
                18.2,
                WeatherCondition::Clear.description(),
            ))
            .unwrap()
            .expect("prediction resolved");
        assert_eq!(resolved.actual_temperature, Some(18.2));

        let predictions = store.predictions("denver").unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].actual_temperature, Some(18.2));
    }

    #[test]
    fn test_resolve_without_prediction_is_noop() {
        let mut store = HistoryStore::in_memory().unwrap();
        assert!(!store.resolve_prediction("Denver", date(2025, 6, 10), 18.2).unwrap());
        assert!(store.predictions("Denver").unwrap().is_empty());
    }

    #[test]
    fn test_unresolved_prediction_is_replaced_resolved_is_kept() {
        let mut store = HistoryStore::in_memory().unwrap();
        store.append_prediction(&prediction("Denver", 10, 19.0)).unwrap();
        store.append_prediction(&prediction("Denver", 10, 20.0)).unwrap();
        let predictions = store.predictions("Denver").unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].predicted_temperature, 20.0);

        assert!(store.resolve_prediction("Denver", date(2025, 6, 10), 18.0).unwrap());
        store.append_prediction(&prediction("Denver", 10, 25.0)).unwrap();
        let predictions = store.predictions("Denver").unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].predicted_temperature, 20.0);
        assert_eq!(predictions[0].actual_temperature, Some(18.0));
    }

    #[test]
    fn test_read_range_and_cities() {
        let mut store = HistoryStore::in_memory().unwrap();
        for d in 1..=6 {
            store.append_or_replace(&day("Phoenix", d, 33.0)).unwrap();
        }
        store.append_or_replace(&day("Denver", 2, 20.0)).unwrap();

        let range = DateRange::new(date(2025, 6, 2), date(2025, 6, 4));
        assert_eq!(store.read_range("Phoenix", range).unwrap().len(), 3);
        assert_eq!(store.cities().unwrap(), vec!["denver", "phoenix"]);
    }

    #[test]
    fn test_current_snapshot() {
        let store = HistoryStore::in_memory().unwrap();
        assert!(store.latest_current("Oslo").unwrap().is_none());

        let current = CurrentConditions {
            city: "oslo".into(),
            display_name: Some("Oslo, Oslo".into()),
            temperature: 4.5,
            feels_like: 1.0,
            humidity: 80,
            wind_speed: 12.0,
            condition: WeatherCondition::Snow,
            observed_at: Utc::now(),
        };
        store.save_current(&current).unwrap();
        assert_eq!(store.latest_current("OSLO").unwrap(), Some(current));
        assert_eq!(store.cities().unwrap(), vec!["oslo"]);
    }

    #[test]
    fn test_stats_and_clear() {
        let mut store = HistoryStore::in_memory().unwrap();
        assert_eq!(store.stats().unwrap().records, 0);

        store.append_or_replace(&day("Phoenix", 1, 30.0)).unwrap();
        store.append_or_replace(&day("Phoenix", 2, 34.0)).unwrap();
        store.append_or_replace(&day("Denver", 2, 20.0)).unwrap();
        store.append_prediction(&prediction("Denver", 3, 21.0)).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.records, 3);
        assert_eq!(stats.cities, 2);
        assert_eq!(stats.predictions, 1);
        assert_eq!(stats.first_date, Some(date(2025, 6, 1)));
        assert_eq!(stats.last_date, Some(date(2025, 6, 2)));
        assert_eq!(stats.min_temperature, Some(15.0));
        assert_eq!(stats.max_temperature, Some(39.0));
        assert_eq!(stats.mean_temperature, Some(28.0));

        store.clear().unwrap();
        let cleared = store.stats().unwrap();
        assert_eq!(cleared.records, 0);
        assert_eq!(cleared.cities, 0);
        assert_eq!(cleared.mean_temperature, None);
        assert_eq!(cleared.predictions, 1);
    }

    #[test]
    fn test_clear_keeps_resolved_predictions() {
        let mut store = HistoryStore::in_memory().unwrap();
        store.append_prediction(&prediction("Denver", 10, 19.0)).unwrap();
        store.append_or_replace(&day("Denver", 10, 18.2)).unwrap();
        store
            .save_current(&CurrentConditions {
                city: "denver".into(),
                display_name: None,
                temperature: 18.0,
                feels_like: 17.0,
                humidity: 30,
                wind_speed: 8.0,
                condition: WeatherCondition::Clear,
                observed_at: Utc::now(),
            })
            .unwrap();

        store.clear().unwrap();

        assert!(store.read_recent("Denver", 7).unwrap().is_empty());
        assert!(store.latest_current("Denver").unwrap().is_none());
        let predictions = store.predictions("Denver").unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].actual_temperature, Some(18.2));
    }

    #[test]
    fn test_summary_of_recent_days() {
        let mut store = HistoryStore::in_memory().unwrap();
        assert_eq!(store.summary("Phoenix", 7).unwrap(), None);

        for (d, avg) in [(1, 30.0), (2, 31.0), (3, 33.0), (4, 34.0), (5, 36.0)] {
            store.append_or_replace(&day("Phoenix", d, avg)).unwrap();
        }
        let summary = store.summary("phoenix", 7).unwrap().expect("summary");
        assert_eq!(summary.days, 5);
        assert_eq!(summary.avg_mean, 32.8);
        assert_eq!(summary.avg_high, 37.8);
        assert_eq!(summary.avg_low, 27.8);
        assert_eq!(summary.hottest, DayExtreme { date: date(2025, 6, 5), temperature: 41.0 });
        assert_eq!(summary.coldest, DayExtreme { date: date(2025, 6, 1), temperature: 25.0 });
        assert_eq!(summary.range, 16.0);
        assert_eq!(summary.trend, Some(Trend::Rising));
        assert_eq!(summary.quality, DataQuality::Good);

        let short = store.summary("Phoenix", 3).unwrap().expect("summary");
        assert_eq!(short.days, 3);
        assert_eq!(short.trend, None);
        assert_eq!(short.quality, DataQuality::Limited);
    }
}
