//! Search pipeline: city name to current conditions, history and a prediction.
//!
//! History goes cache → provider → store (write-through) → cache. When the
//! provider is unreachable after retries the last persisted data is returned
//! and flagged as stale. Concurrent requests for one city share a single
//! fetch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Local;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cache::HistoryCache;
use crate::predictor::{AccuracySummary, PredictionResult, Predictor};
use crate::provider::WeatherProvider;
use crate::store::{HistoryStore, HistorySummary, StoreStats};
use crate::types::{
    normalize_city, validate_city_name, CurrentConditions, DailyRecord, DateRange, WeatherError,
};

pub const DEFAULT_HISTORY_DAYS: u32 = 7;

/// Where a piece of data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Fetched from the provider just now
    Live,
    /// Served from the in-memory history cache
    Cache,
    /// Provider unreachable; last persisted data
    Stale,
}

impl DataSource {
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fetched<T> {
    pub data: T,
    pub source: DataSource,
}

impl<T> Fetched<T> {
    fn new(data: T, source: DataSource) -> Self {
        Self { data, source }
    }
}

/// Everything one city search produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    pub city: String,
    pub current: Option<Fetched<CurrentConditions>>,
    pub history: Fetched<Vec<DailyRecord>>,
    /// None when there is no history to predict from
    pub prediction: Option<PredictionResult>,
    pub accuracy: AccuracySummary,
}

impl SearchReport {
    /// True if any part of the report is last-known rather than fresh data.
    pub fn is_stale(&self) -> bool {
        self.history.source.is_stale()
            || self
                .current
                .as_ref()
                .is_some_and(|c| c.source.is_stale())
    }
}

type SharedResult<T> = Shared<BoxFuture<'static, Result<T, WeatherError>>>;

/// Requests currently running, keyed by normalized city.
///
/// The work runs in its own task and removes its entry when it finishes, so a
/// caller that stops waiting leaves nothing behind.
struct InFlight<T> {
    running: Arc<Mutex<HashMap<String, SharedResult<T>>>>,
}

impl<T> Clone for InFlight<T> {
    fn clone(&self) -> Self {
        Self {
            running: Arc::clone(&self.running),
        }
    }
}

impl<T> Default for InFlight<T> {
    fn default() -> Self {
        Self {
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Join the running request for `key`, or start one with `start`.
    fn join_or_start<F, Fut>(&self, key: &str, what: &str, start: F) -> SharedResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, WeatherError>> + Send + 'static,
    {
        let mut running = self.running.lock();
        if let Some(existing) = running.get(key) {
            tracing::debug!("Joining in-flight {} for {}", what, key);
            return existing.clone();
        }

        let work = start();
        let registry = Arc::clone(&self.running);
        let owned_key = key.to_string();
        let task = tokio::spawn(async move {
            let result = work.await;
            registry.lock().remove(&owned_key);
            result
        });

        let what = what.to_string();
        let shared = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(WeatherError::Storage(format!("{} task failed: {}", what, e))),
            }
        }
        .boxed()
        .shared();
        running.insert(key.to_string(), shared.clone());
        shared
    }

    fn len(&self) -> usize {
        self.running.lock().len()
    }
}

#[derive(Clone)]
pub struct WeatherService {
    provider: WeatherProvider,
    cache: Arc<HistoryCache>,
    store: Arc<Mutex<HistoryStore>>,
    predictor: Arc<Predictor>,
    history_days: u32,
    current_runs: InFlight<Fetched<CurrentConditions>>,
    history_runs: InFlight<Fetched<Vec<DailyRecord>>>,
    search_runs: InFlight<SearchReport>,
}

impl std::fmt::Debug for WeatherService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherService")
            .field("history_days", &self.history_days)
            .field("cache", &self.cache.stats())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl WeatherService {
    pub fn new(
        provider: WeatherProvider,
        store: HistoryStore,
        cache: HistoryCache,
        predictor: Predictor,
        history_days: u32,
    ) -> Self {
        Self {
            provider,
            cache: Arc::new(cache),
            store: Arc::new(Mutex::new(store)),
            predictor: Arc::new(predictor),
            history_days: history_days.max(1),
            current_runs: InFlight::default(),
            history_runs: InFlight::default(),
            search_runs: InFlight::default(),
        }
    }

    pub fn cache(&self) -> &HistoryCache {
        &self.cache
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    /// Requests still running (current, history and searches together).
    pub fn in_flight(&self) -> usize {
        self.current_runs.len() + self.history_runs.len() + self.search_runs.len()
    }

    /// Run a closure against the store on the blocking pool.
    async fn with_store<T, F>(&self, f: F) -> Result<T, WeatherError>
    where
        F: FnOnce(&mut HistoryStore) -> Result<T, WeatherError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let mut guard = store.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| WeatherError::Storage(format!("store task failed: {}", e)))?
    }

    /// Current conditions, falling back to the last snapshot when the
    /// provider is unreachable. Concurrent calls for one city share a request.
    pub async fn current(&self, city: &str) -> Result<Fetched<CurrentConditions>, WeatherError> {
        let city = validate_city_name(city)?;
        let key = normalize_city(&city);
        let this = self.clone();
        self.current_runs
            .join_or_start(&key, "current conditions", move || async move {
                this.fetch_current(city).await
            })
            .await
    }

    async fn fetch_current(
        &self,
        city: String,
    ) -> Result<Fetched<CurrentConditions>, WeatherError> {
        match self.provider.fetch_current(&city).await {
            Ok(current) => {
                let snapshot = current.clone();
                if let Err(e) = self.with_store(move |s| s.save_current(&snapshot)).await {
                    tracing::warn!("Could not persist current conditions for {}: {}", city, e);
                }
                Ok(Fetched::new(current, DataSource::Live))
            }
            Err(e) if e.is_retryable() => {
                let key = normalize_city(&city);
                match self.with_store(move |s| s.latest_current(&key)).await? {
                    Some(last) => {
                        tracing::warn!(
                            "Provider unreachable for {} ({}), using snapshot from {}",
                            city,
                            e,
                            last.observed_at
                        );
                        Ok(Fetched::new(last, DataSource::Stale))
                    }
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// The trailing history window for `city`, oldest first.
    pub async fn history(&self, city: &str) -> Result<Fetched<Vec<DailyRecord>>, WeatherError> {
        let city = validate_city_name(city)?;
        let key = normalize_city(&city);
        let range = DateRange::trailing(Local::now().date_naive(), self.history_days);

        if let Some(records) = self.cache.get(&key, range) {
            tracing::debug!("History for {} served from cache", key);
            return Ok(Fetched::new(records, DataSource::Cache));
        }

        let this = self.clone();
        self.history_runs
            .join_or_start(&key, "history fetch", move || async move {
                this.fetch_history(city, range).await
            })
            .await
    }

    async fn fetch_history(
        &self,
        city: String,
        range: DateRange,
    ) -> Result<Fetched<Vec<DailyRecord>>, WeatherError> {
        let key = normalize_city(&city);
        match self.provider.fetch_history(&city, range).await {
            Ok(records) => {
                let to_store = records.clone();
                match self.with_store(move |s| s.append_all(&to_store)).await {
                    Ok(resolved) if !resolved.is_empty() => {
                        tracing::info!("{} prediction(s) resolved for {}", resolved.len(), key);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Could not persist history for {}: {}", key, e),
                }
                self.cache.put(&key, range, records.clone());
                Ok(Fetched::new(records, DataSource::Live))
            }
            Err(e) if e.is_retryable() => {
                let days = self.history_days as usize;
                let lookup = key.clone();
                let records = self.with_store(move |s| s.read_recent(&lookup, days)).await?;
                if records.is_empty() {
                    return Err(e);
                }
                tracing::warn!(
                    "Provider unreachable for {} ({}), using {} stored days",
                    key,
                    e,
                    records.len()
                );
                Ok(Fetched::new(records, DataSource::Stale))
            }
            Err(e) => Err(e),
        }
    }

    /// Predict tomorrow from stored history and record the prediction.
    pub async fn predict(&self, city: &str) -> Result<PredictionResult, WeatherError> {
        let city = validate_city_name(city)?;
        let predictor = Arc::clone(&self.predictor);
        self.with_store(move |s| predictor.predict(s, &city)).await
    }

    pub async fn accuracy(&self, city: &str) -> Result<AccuracySummary, WeatherError> {
        let city = validate_city_name(city)?;
        let predictor = Arc::clone(&self.predictor);
        self.with_store(move |s| predictor.accuracy(s, &city)).await
    }

    /// Full search: current conditions and history in parallel, then a
    /// prediction and the accuracy record. A search for a city that is
    /// already being searched joins it.
    pub async fn search(&self, city: &str) -> Result<SearchReport, WeatherError> {
        let city = validate_city_name(city)?;
        let key = normalize_city(&city);
        let this = self.clone();
        self.search_runs
            .join_or_start(&key, "search", move || async move { this.run_search(city).await })
            .await
    }

    #[tracing::instrument(skip(self), level = "info")]
    async fn run_search(&self, city: String) -> Result<SearchReport, WeatherError> {
        let (current, history) = tokio::join!(self.current(&city), self.history(&city));

        let history = history?;
        let current = match current {
            Ok(current) => Some(current),
            Err(e) => {
                tracing::warn!("No current conditions for {}: {}", city, e);
                None
            }
        };

        let prediction = match self.predict(&city).await {
            Ok(p) => Some(p),
            Err(WeatherError::InsufficientData(_)) => None,
            Err(e) => return Err(e),
        };
        let accuracy = self.accuracy(&city).await?;

        Ok(SearchReport {
            city: normalize_city(&city),
            current,
            history,
            prediction,
            accuracy,
        })
    }

    /// Averages and extremes over the stored history window.
    pub async fn summary(&self, city: &str) -> Result<Option<HistorySummary>, WeatherError> {
        let city = validate_city_name(city)?;
        let days = self.history_days as usize;
        self.with_store(move |s| s.summary(&city, days)).await
    }

    pub async fn cities(&self) -> Result<Vec<String>, WeatherError> {
        self.with_store(|s| s.cities()).await
    }

    pub async fn stats(&self) -> Result<StoreStats, WeatherError> {
        self.with_store(|s| s.stats()).await
    }

    /// Drop stored days, snapshots and cached history. Predictions stay.
    pub async fn clear(&self) -> Result<(), WeatherError> {
        self.with_store(|s| s.clear()).await?;
        self.cache.clear();
        Ok(())
    }
}
