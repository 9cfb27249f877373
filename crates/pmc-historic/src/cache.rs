use chrono::{DateTime, Duration, Utc};
use pmc_core::historic_contracts::{AggregateResult, YearlyTotal};
use std::collections::HashMap;
use std::sync::Mutex;

pub const CACHE_TTL_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub year: i32,
    pub include_recurring: bool,
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    payload: T,
    computed_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.computed_at < Duration::minutes(CACHE_TTL_MINUTES)
    }
}

/// Memoizes aggregation results per `(year, include_recurring)` key.
/// Entries are superseded in place, never evicted; the key space is small
/// enough (years x 2 flags) that unbounded growth is fine. Interior mutex
/// because requests run on a multi-threaded runtime; concurrent misses on
/// one key may fetch twice, which costs a round-trip and nothing else.
#[derive(Debug, Default)]
pub struct HistoricCache {
    results: Mutex<HashMap<CacheKey, CacheEntry<AggregateResult>>>,
    year_totals: Mutex<HashMap<CacheKey, CacheEntry<YearlyTotal>>>,
}

impl HistoricCache {
    pub fn get(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<AggregateResult> {
        let results = self.results.lock().ok()?;
        results
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.payload.clone())
    }

    pub fn put(&self, key: CacheKey, payload: AggregateResult, now: DateTime<Utc>) {
        if let Ok(mut results) = self.results.lock() {
            results.insert(
                key,
                CacheEntry {
                    payload,
                    computed_at: now,
                },
            );
        }
    }

    pub fn get_year_total(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<YearlyTotal> {
        let totals = self.year_totals.lock().ok()?;
        totals
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.payload.clone())
    }

    pub fn put_year_total(&self, key: CacheKey, payload: YearlyTotal, now: DateTime<Utc>) {
        if let Ok(mut totals) = self.year_totals.lock() {
            totals.insert(
                key,
                CacheEntry {
                    payload,
                    computed_at: now,
                },
            );
        }
    }
}
