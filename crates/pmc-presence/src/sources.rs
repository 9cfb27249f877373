use chrono::{DateTime, Utc};
use pmc_core::presence_contracts::PresenceConfig;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const CONFIG_FILE: &str = "config.json";
pub const LAST_RUN_FILE: &str = "last-run.json";
pub const HISTORY_FILE: &str = "history.json";
pub const LOG_FILE: &str = "heartbeat.log";
pub const LEGACY_STATE_FILE: &str = "state.json";

#[derive(Debug, Deserialize)]
struct LastRunRecord {
    #[serde(rename = "lastRun")]
    last_run: String,
}

#[derive(Debug, Deserialize)]
struct LegacyState {
    #[serde(rename = "lastHeartbeatTime")]
    last_heartbeat_time: String,
}

/// Everything the reconstructor reads, loaded from a data directory.
/// Every source is optional: a missing or malformed file is the same as
/// an absent source, and loading never fails.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatSources {
    pub config: PresenceConfig,
    pub last_run: Option<DateTime<Utc>>,
    pub history: Vec<DateTime<Utc>>,
    pub log_timestamps: Vec<DateTime<Utc>>,
    pub legacy_last_heartbeat: Option<DateTime<Utc>>,
}

impl HeartbeatSources {
    pub fn load(dir: &Path) -> Self {
        Self {
            config: read_json(&dir.join(CONFIG_FILE)).unwrap_or_default(),
            last_run: read_json::<LastRunRecord>(&dir.join(LAST_RUN_FILE))
                .and_then(|record| parse_timestamp(&record.last_run)),
            history: read_json::<Vec<String>>(&dir.join(HISTORY_FILE))
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|entry| parse_timestamp(entry))
                        .collect()
                })
                .unwrap_or_default(),
            log_timestamps: fs::read_to_string(dir.join(LOG_FILE))
                .map(|text| scan_log(&text))
                .unwrap_or_default(),
            legacy_last_heartbeat: read_json::<LegacyState>(&dir.join(LEGACY_STATE_FILE))
                .and_then(|state| parse_timestamp(&state.last_heartbeat_time)),
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let text = fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Pull heartbeat-start timestamps out of a raw log stream. Only lines of
/// the form `<ISO-8601> [heartbeat] started` are meaningful.
pub fn scan_log(text: &str) -> Vec<DateTime<Utc>> {
    let pattern = Regex::new(r"(?m)^(\S+)\s+\[heartbeat\]\s+started\b").expect("valid regex");
    pattern
        .captures_iter(text)
        .filter_map(|captures| parse_timestamp(captures.get(1)?.as_str()))
        .collect()
}
