//! In-memory history cache keyed by (city, date range).
//!
//! Expiry is lazy: a stale entry is dropped when it is looked up. Ranges made
//! only of fully elapsed days never go stale because archived days don't change.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use parking_lot::Mutex;

use crate::types::{normalize_city, DailyRecord, DateRange};

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_MAX_ENTRIES: usize = 64;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub city: String,
    pub date_range: DateRange,
    pub records: Vec<DailyRecord>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Whether this entry should be treated as a miss at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, today: NaiveDate, ttl: Duration) -> bool {
        if self.date_range.end < today {
            return false;
        }
        let age = now.signed_duration_since(self.fetched_at);
        age.to_std().map(|age| age > ttl).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<(String, DateRange), CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

#[derive(Debug)]
pub struct HistoryCache {
    ttl: Duration,
    max_entries: usize,
    state: Mutex<CacheState>,
}

impl Default for HistoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

impl HistoryCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, city: &str, range: DateRange) -> Option<Vec<DailyRecord>> {
        let now = Utc::now();
        self.get_at(city, range, now, now.with_timezone(&Local).date_naive())
    }

    /// Lookup with an explicit clock.
    pub fn get_at(
        &self,
        city: &str,
        range: DateRange,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Option<Vec<DailyRecord>> {
        let key = (normalize_city(city), range);
        let mut state = self.state.lock();

        let stale = match state.entries.get(&key) {
            None => {
                state.misses += 1;
                tracing::debug!("History cache miss for {} {}", key.0, range);
                return None;
            }
            Some(entry) => entry.is_stale(now, today, self.ttl),
        };

        if stale {
            state.entries.remove(&key);
            state.misses += 1;
            tracing::debug!("History cache entry for {} {} is stale", key.0, range);
            return None;
        }

        state.hits += 1;
        state.entries.get(&key).map(|entry| entry.records.clone())
    }

    pub fn put(&self, city: &str, range: DateRange, records: Vec<DailyRecord>) {
        self.put_at(city, range, records, Utc::now());
    }

    pub fn put_at(
        &self,
        city: &str,
        range: DateRange,
        records: Vec<DailyRecord>,
        fetched_at: DateTime<Utc>,
    ) {
        let city = normalize_city(city);
        let mut state = self.state.lock();
        let key = (city.clone(), range);

        if !state.entries.contains_key(&key) && state.entries.len() >= self.max_entries {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.fetched_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                state.entries.remove(&oldest);
                state.evictions += 1;
                tracing::debug!("Evicted history cache entry for {} {}", oldest.0, oldest.1);
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                city,
                date_range: range,
                records,
                fetched_at,
            },
        );
    }

    /// Drop every entry for a city.
    pub fn invalidate(&self, city: &str) {
        let city = normalize_city(city);
        self.state.lock().entries.retain(|(c, _), _| *c != city);
    }

    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }
}
