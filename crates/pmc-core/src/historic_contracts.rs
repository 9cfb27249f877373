use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// A completed-task record as returned by the external task API.
/// Read-only input to aggregation; every field is defensively defaulted
/// because the upstream writer is not trusted to honor its own contract.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskRecord {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: i64,
    #[serde(default)]
    pub completed: i64,
    #[serde(default)]
    pub added: i64,
    #[serde(default)]
    pub folder: i64,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub repeat: Option<String>,
}

impl TaskRecord {
    /// A repeat descriptor that is present, non-empty, and not "None".
    pub fn is_recurring(&self) -> bool {
        match self.repeat.as_deref() {
            Some(repeat) => {
                let repeat = repeat.trim();
                !repeat.is_empty() && !repeat.eq_ignore_ascii_case("none")
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Folder {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyBucket {
    pub month: u32,
    pub count: u32,
    #[serde(rename = "avgDaysToClose")]
    pub avg_days_to_close: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderCount {
    pub name: String,
    pub count: u32,
}

/// Flat per-year total with its 12-month sparkline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearlyTotal {
    pub year: i32,
    pub total: u32,
    pub monthly: [u32; 12],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    pub year: i32,
    #[serde(rename = "totalCompleted")]
    pub total_completed: u32,
    #[serde(rename = "monthlyBreakdown")]
    pub monthly_breakdown: Vec<MonthlyBucket>,
    #[serde(rename = "priorityBreakdown")]
    pub priority_breakdown: BTreeMap<String, u32>,
    #[serde(rename = "folderBreakdown")]
    pub folder_breakdown: Vec<FolderCount>,
    #[serde(rename = "dayOfWeekBreakdown")]
    pub day_of_week_breakdown: [u32; 7],
    #[serde(rename = "yearlyTotals")]
    pub yearly_totals: Vec<YearlyTotal>,
}

/// Deserialize an id that can be either a number or a numeric string.
fn deserialize_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let val: serde_json::Value = serde_json::Value::deserialize(deserializer)?;
    match val {
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom("id out of range")),
        serde_json::Value::String(s) => s.parse::<i64>().map_err(serde::de::Error::custom),
        serde_json::Value::Null => Ok(0),
        _ => Err(serde::de::Error::custom("expected string or number for id")),
    }
}
