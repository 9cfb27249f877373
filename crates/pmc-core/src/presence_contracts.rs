use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_INTERVAL_MINUTES: i64 = 30;

/// Where a heartbeat candidate came from, in admission priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HeartbeatSourceKind {
    History,
    LastRun,
    Log,
}

impl HeartbeatSourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeartbeatSourceKind::History => "history",
            HeartbeatSourceKind::LastRun => "last-run",
            HeartbeatSourceKind::Log => "log",
        }
    }
}

impl fmt::Display for HeartbeatSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single instant at which the watched process is known to have run.
/// Reconstructed fresh on every query; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatEvent {
    pub timestamp: DateTime<Utc>,
    pub source: HeartbeatSourceKind,
}

/// One expected checkpoint in the fixed-interval schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PresenceSlot {
    #[serde(rename = "slotTime")]
    pub slot_time: DateTime<Utc>,
    pub satisfied: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Stale,
    Unknown,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Healthy => "healthy",
            ServiceStatus::Stale => "stale",
            ServiceStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hours-of-day window during which the watched process is expected to run.
/// Wrapping windows (start > end) cover the overnight case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveHours {
    pub start: u32,
    pub end: u32,
}

impl ActiveHours {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            hour >= self.start && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

impl Default for ActiveHours {
    fn default() -> Self {
        Self { start: 7, end: 24 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceConfig {
    #[serde(default = "default_every")]
    pub every: String,
    #[serde(default, rename = "activeHours")]
    pub active_hours: ActiveHours,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
}

fn default_every() -> String {
    "30m".to_string()
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            every: default_every(),
            active_hours: ActiveHours::default(),
            model: None,
            target: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresenceResult {
    pub config: PresenceConfig,
    #[serde(rename = "lastHeartbeat")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub status: ServiceStatus,
    #[serde(rename = "history24h")]
    pub history24h: Vec<PresenceSlot>,
}

/// Parse a compact duration string such as `"30m"`, `"2h"`, or `"90s"`.
/// Bare digits are minutes. Anything unparseable or non-positive falls
/// back to the 30-minute default.
pub fn parse_every(text: &str) -> Duration {
    parse_every_strict(text).unwrap_or_else(|| Duration::minutes(DEFAULT_INTERVAL_MINUTES))
}

fn parse_every_strict(text: &str) -> Option<Duration> {
    let trimmed = text.trim().to_lowercase();
    if trimmed.is_empty() {
        return None;
    }
    let (digits, unit) = match trimmed.find(|c: char| !c.is_ascii_digit()) {
        Some(index) => trimmed.split_at(index),
        None => (trimmed.as_str(), "m"),
    };
    let value: i64 = digits.parse().ok()?;
    if value <= 0 {
        return None;
    }
    match unit.trim() {
        "m" | "min" | "mins" => Some(Duration::minutes(value)),
        "h" | "hr" | "hrs" => Some(Duration::hours(value)),
        "s" | "sec" | "secs" => Some(Duration::seconds(value)),
        _ => None,
    }
}
