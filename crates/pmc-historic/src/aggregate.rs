use chrono::{DateTime, Datelike, Utc};
use pmc_core::historic_contracts::{
    AggregateResult, FolderCount, MonthlyBucket, TaskRecord, YearlyTotal,
};
use std::collections::{BTreeMap, HashMap};

/// First year of the multi-year sparkline span.
pub const SPAN_START_YEAR: i32 = 2018;

const MAX_DAYS_TO_CLOSE: f64 = 365.0;
const TOP_FOLDERS: usize = 6;
const SECS_PER_DAY: f64 = 86_400.0;

pub fn filter_recurring(records: Vec<TaskRecord>, include_recurring: bool) -> Vec<TaskRecord> {
    if include_recurring {
        return records;
    }
    records
        .into_iter()
        .filter(|record| !record.is_recurring())
        .collect()
}

/// Full per-year breakdowns over already-filtered records. The caller
/// fills in `yearly_totals` afterwards.
pub fn aggregate_year(
    year: i32,
    records: &[TaskRecord],
    folder_names: &HashMap<i64, String>,
) -> AggregateResult {
    let mut month_counts = [0u32; 12];
    let mut close_sums = [0f64; 12];
    let mut close_counts = [0u32; 12];
    let mut day_of_week = [0u32; 7];
    let mut folder_counts: HashMap<i64, u32> = HashMap::new();
    // Seeded so unseen in-range priorities still report zero.
    let mut priority_breakdown: BTreeMap<String, u32> =
        (0..=3).map(|p: i64| (p.to_string(), 0)).collect();

    for record in records {
        let Some(completed) = DateTime::<Utc>::from_timestamp(record.completed, 0) else {
            continue;
        };
        let month_index = completed.month0() as usize;
        month_counts[month_index] += 1;
        day_of_week[completed.weekday().num_days_from_sunday() as usize] += 1;
        *priority_breakdown
            .entry(record.priority.to_string())
            .or_insert(0) += 1;
        *folder_counts.entry(record.folder).or_insert(0) += 1;

        // Days-to-close is only meaningful when a creation stamp exists;
        // negative and outlier latencies are clamped, not dropped.
        if record.added > 0 {
            let days = (record.completed - record.added) as f64 / SECS_PER_DAY;
            close_sums[month_index] += days.clamp(0.0, MAX_DAYS_TO_CLOSE);
            close_counts[month_index] += 1;
        }
    }

    let monthly_breakdown = (0..12)
        .map(|index| MonthlyBucket {
            month: index as u32 + 1,
            count: month_counts[index],
            avg_days_to_close: if close_counts[index] > 0 {
                close_sums[index] / f64::from(close_counts[index])
            } else {
                0.0
            },
        })
        .collect();

    AggregateResult {
        year,
        total_completed: records.len() as u32,
        monthly_breakdown,
        priority_breakdown,
        folder_breakdown: rank_folders(folder_counts, folder_names),
        day_of_week_breakdown: day_of_week,
        yearly_totals: Vec::new(),
    }
}

/// Just the flat total and 12-month sparkline for one year.
pub fn year_total(year: i32, records: &[TaskRecord]) -> YearlyTotal {
    let mut monthly = [0u32; 12];
    for record in records {
        if let Some(completed) = DateTime::<Utc>::from_timestamp(record.completed, 0) {
            monthly[completed.month0() as usize] += 1;
        }
    }
    YearlyTotal {
        year,
        total: records.len() as u32,
        monthly,
    }
}

/// Top folders by count plus a synthetic "Other" bucket for the rest,
/// which is only emitted when non-zero.
fn rank_folders(
    folder_counts: HashMap<i64, u32>,
    folder_names: &HashMap<i64, String>,
) -> Vec<FolderCount> {
    let mut ranked: Vec<FolderCount> = folder_counts
        .into_iter()
        .map(|(id, count)| FolderCount {
            name: folder_names
                .get(&id)
                .cloned()
                .unwrap_or_else(|| id.to_string()),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));

    let other: u32 = ranked.iter().skip(TOP_FOLDERS).map(|entry| entry.count).sum();
    ranked.truncate(TOP_FOLDERS);
    if other > 0 {
        ranked.push(FolderCount {
            name: "Other".to_string(),
            count: other,
        });
    }
    ranked
}
