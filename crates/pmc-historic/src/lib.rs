use async_trait::async_trait;
use chrono::{Datelike, Utc};
use pmc_core::historic_contracts::{AggregateResult, Folder, TaskRecord, YearlyTotal};
use pmc_core::Clock;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub mod aggregate;
pub mod cache;
pub mod client;

pub use cache::{CacheKey, HistoricCache, CACHE_TTL_MINUTES};

use aggregate::{aggregate_year, filter_recurring, year_total, SPAN_START_YEAR};

pub const PAGE_SIZE: usize = 1000;
// Hard termination bound against a server that misreports its total and
// keeps returning full pages.
const MAX_PAGES: usize = 100;

#[derive(Debug, Error)]
pub enum HistoricError {
    #[error("task api request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("task api returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected task api payload: {0}")]
    Decode(String),
    #[error("pagination exceeded {max_pages} pages for year {year}")]
    PaginationOverrun { year: i32, max_pages: usize },
}

/// One page request against the task API: completed tasks in the
/// half-open `(after, before)` epoch window, `num` records from `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub after: i64,
    pub before: i64,
    pub start: usize,
    pub num: usize,
}

/// The external paginated data source. Pages come back as raw JSON
/// values because the first element of the first page may be `{num,
/// total}` metadata rather than a task record.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<Value>, HistoricError>;
    async fn fetch_folders(&self) -> Result<Vec<Folder>, HistoricError>;
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    #[allow(dead_code)]
    num: u64,
    total: u64,
}

/// Year-scoped task-completion analytics over a rate-limited paginated
/// API, memoized per `(year, include_recurring)` for the cache TTL.
pub struct HistoricService<S: TaskSource> {
    source: S,
    cache: HistoricCache,
    clock: Arc<dyn Clock>,
}

impl<S: TaskSource> HistoricService<S> {
    pub fn new(source: S, cache: HistoricCache, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            cache,
            clock,
        }
    }

    /// Fetch failures propagate untouched: stale-but-wrong analytics are
    /// worse than an explicit error.
    pub async fn get_historic(
        &self,
        year: i32,
        include_recurring: bool,
    ) -> Result<AggregateResult, HistoricError> {
        let key = CacheKey {
            year,
            include_recurring,
        };
        let now = self.clock.now();
        if let Some(hit) = self.cache.get(&key, now) {
            debug!(event = "historic_cache_hit", year, include_recurring);
            return Ok(hit);
        }

        info!(event = "historic_refresh", year, include_recurring);
        let folder_names: HashMap<i64, String> = self
            .source
            .fetch_folders()
            .await?
            .into_iter()
            .map(|folder| (folder.id, folder.name))
            .collect();

        let fetched = self.fetch_year(year).await?;
        let completed: Vec<TaskRecord> = fetched
            .into_iter()
            .filter(|record| record.completed > 0)
            .collect();
        let kept = filter_recurring(completed, include_recurring);

        let mut result = aggregate_year(year, &kept, &folder_names);
        let primary_total = year_total(year, &kept);
        self.cache
            .put_year_total(key, primary_total.clone(), self.clock.now());

        let current_year = now.year();
        let mut yearly_totals = Vec::new();
        for span_year in SPAN_START_YEAR..=current_year {
            if span_year == year {
                yearly_totals.push(primary_total.clone());
            } else {
                yearly_totals.push(self.year_total_cached(span_year, include_recurring).await?);
            }
        }
        result.yearly_totals = yearly_totals;

        self.cache.put(key, result.clone(), self.clock.now());
        Ok(result)
    }

    /// Per-year sparkline contribution, memoized under the same TTL.
    /// Keyed strictly per recurrence flag so a borrowed total is always
    /// filtered the way the current request asked for.
    async fn year_total_cached(
        &self,
        year: i32,
        include_recurring: bool,
    ) -> Result<YearlyTotal, HistoricError> {
        let key = CacheKey {
            year,
            include_recurring,
        };
        if let Some(hit) = self.cache.get_year_total(&key, self.clock.now()) {
            debug!(event = "year_total_cache_hit", year, include_recurring);
            return Ok(hit);
        }

        let fetched = self.fetch_year(year).await?;
        let completed: Vec<TaskRecord> = fetched
            .into_iter()
            .filter(|record| record.completed > 0)
            .collect();
        let kept = filter_recurring(completed, include_recurring);
        let total = year_total(year, &kept);
        self.cache
            .put_year_total(key, total.clone(), self.clock.now());
        Ok(total)
    }

    /// Sequential paginated fetch of one year. Terminates on a short
    /// page; the server-reported total is only an advisory short-circuit.
    async fn fetch_year(&self, year: i32) -> Result<Vec<TaskRecord>, HistoricError> {
        let (after, before) = year_bounds(year);
        let mut records = Vec::new();
        let mut reported_total: Option<u64> = None;
        let mut start = 0usize;

        for page_index in 0..MAX_PAGES {
            let query = PageQuery {
                after,
                before,
                start,
                num: PAGE_SIZE,
            };
            let mut page = self.source.fetch_page(&query).await?;
            if page_index == 0 {
                if let Some(meta) = strip_page_meta(&mut page) {
                    reported_total = Some(meta.total);
                }
            }
            let page_len = page.len();
            for value in page {
                records.push(decode_record(value)?);
            }
            start += page_len;

            if page_len < PAGE_SIZE {
                info!(event = "year_fetched", year, records = records.len(), pages = page_index + 1);
                return Ok(records);
            }
            if let Some(total) = reported_total {
                if records.len() as u64 >= total {
                    info!(event = "year_fetched", year, records = records.len(), pages = page_index + 1);
                    return Ok(records);
                }
            }
        }

        Err(HistoricError::PaginationOverrun {
            year,
            max_pages: MAX_PAGES,
        })
    }
}

fn year_bounds(year: i32) -> (i64, i64) {
    use chrono::TimeZone;
    let start = Utc
        .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .map(|dt| dt.timestamp())
        .unwrap_or(0);
    let end = Utc
        .with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0)
        .single()
        .map(|dt| dt.timestamp())
        .unwrap_or(i64::MAX);
    (start - 1, end)
}

/// The first element of the first page is `{num, total}` bookkeeping when
/// it lacks an `id`; strip it so it is never decoded as a task.
fn strip_page_meta(page: &mut Vec<Value>) -> Option<PageMeta> {
    let first = page.first()?.as_object()?;
    if first.contains_key("id") || !first.contains_key("total") {
        return None;
    }
    serde_json::from_value(page.remove(0)).ok()
}

fn decode_record(value: Value) -> Result<TaskRecord, HistoricError> {
    serde_json::from_value(value).map_err(|err| HistoricError::Decode(err.to_string()))
}
