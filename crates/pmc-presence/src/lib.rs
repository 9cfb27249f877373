use chrono::{DateTime, Duration, Timelike, Utc};
use pmc_core::presence_contracts::{
    parse_every, HeartbeatEvent, HeartbeatSourceKind, PresenceConfig, PresenceResult, PresenceSlot,
    ServiceStatus,
};

pub mod sources;

pub use sources::HeartbeatSources;

const LOOKBACK_HOURS: i64 = 24;
const DEDUP_WINDOW_SECS: i64 = 60;
const SLOT_TOLERANCE_SECS: i64 = 600;
const STALE_AFTER_MINUTES: i64 = 45;
// Hours during which the watched process is never expected to run. Fixed
// rule with boundaries at hour 7 and midnight; independent of the
// configured active-hours window.
const QUIET_FIRST_HOUR: u32 = 1;
const QUIET_LAST_HOUR: u32 = 6;

/// Answer "is this periodic background process healthy?" from written
/// artifacts alone. `now` is captured once by the caller so slot
/// boundaries stay internally consistent.
///
/// Never fails: absent or malformed sources degrade to an explicit
/// `Unknown`/empty result.
pub fn reconstruct(sources: &HeartbeatSources, now: DateTime<Utc>) -> PresenceResult {
    let interval = parse_every(&sources.config.every);
    let window_start = now - Duration::hours(LOOKBACK_HOURS);
    let events = collect_events(sources, window_start);

    let last_heartbeat = sources
        .last_run
        .or_else(|| events.first().map(|event| event.timestamp))
        .or(sources.legacy_last_heartbeat);

    PresenceResult {
        config: sources.config.clone(),
        last_heartbeat,
        status: judge_status(&sources.config, last_heartbeat, now),
        history24h: build_slots(&events, interval, now),
    }
}

/// Merge the three candidate streams in priority order, discarding any
/// candidate that lands within the dedup window of an already-accepted
/// event from any source. Returns events sorted newest-first.
fn collect_events(sources: &HeartbeatSources, window_start: DateTime<Utc>) -> Vec<HeartbeatEvent> {
    let candidates = sources
        .history
        .iter()
        .map(|ts| (HeartbeatSourceKind::History, *ts))
        .chain(
            sources
                .last_run
                .iter()
                .map(|ts| (HeartbeatSourceKind::LastRun, *ts)),
        )
        .chain(
            sources
                .log_timestamps
                .iter()
                .map(|ts| (HeartbeatSourceKind::Log, *ts)),
        );

    let mut accepted: Vec<HeartbeatEvent> = Vec::new();
    for (source, timestamp) in candidates {
        if timestamp < window_start {
            continue;
        }
        let duplicate = accepted
            .iter()
            .any(|event| (event.timestamp - timestamp).num_seconds().abs() < DEDUP_WINDOW_SECS);
        if duplicate {
            continue;
        }
        accepted.push(HeartbeatEvent { timestamp, source });
    }
    accepted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    accepted
}

/// One slot per expected run, walking backward from `now`. A slot is
/// satisfied when any accepted event lies within the tolerance window of
/// its nominal time.
fn build_slots(
    events: &[HeartbeatEvent],
    interval: Duration,
    now: DateTime<Utc>,
) -> Vec<PresenceSlot> {
    let interval_secs = interval.num_seconds().max(60);
    let slot_count = (LOOKBACK_HOURS * 3600 / interval_secs) as usize;
    (0..slot_count)
        .map(|index| {
            let slot_time = now - Duration::seconds(interval_secs * index as i64);
            let satisfied = events.iter().any(|event| {
                (event.timestamp - slot_time).num_seconds().abs() <= SLOT_TOLERANCE_SECS
            });
            PresenceSlot {
                slot_time,
                satisfied,
            }
        })
        .collect()
}

fn judge_status(
    config: &PresenceConfig,
    last_heartbeat: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> ServiceStatus {
    let hour = now.hour();
    let quiet = hour >= QUIET_FIRST_HOUR && hour <= QUIET_LAST_HOUR;
    if quiet || !config.active_hours.contains(hour) {
        return ServiceStatus::Healthy;
    }
    match last_heartbeat {
        None => ServiceStatus::Unknown,
        Some(ts) if now - ts > Duration::minutes(STALE_AFTER_MINUTES) => ServiceStatus::Stale,
        Some(_) => ServiceStatus::Healthy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pmc_core::presence_contracts::ActiveHours;

    fn ts(hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, min, sec)
            .single()
            .expect("valid timestamp")
    }

    fn always_active() -> PresenceConfig {
        PresenceConfig {
            active_hours: ActiveHours { start: 0, end: 24 },
            ..PresenceConfig::default()
        }
    }

    #[test]
    fn dedup_collapses_nearby_events_across_all_sources() {
        let sources = HeartbeatSources {
            history: vec![ts(11, 0, 0), ts(11, 0, 30)],
            last_run: Some(ts(11, 0, 45)),
            log_timestamps: vec![ts(11, 0, 50), ts(11, 0, 10)],
            ..HeartbeatSources::default()
        };
        let events = collect_events(&sources, ts(11, 0, 0) - Duration::hours(24));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, ts(11, 0, 0));
        assert_eq!(events[0].source, HeartbeatSourceKind::History);
    }

    #[test]
    fn dedup_compares_against_full_accumulated_set() {
        // Log event within 60s of a history event is suppressed even
        // though the two come from different sources.
        let sources = HeartbeatSources {
            history: vec![ts(10, 0, 0)],
            log_timestamps: vec![ts(10, 0, 59), ts(10, 2, 0)],
            ..HeartbeatSources::default()
        };
        let events = collect_events(&sources, ts(10, 0, 0) - Duration::hours(24));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp, ts(10, 2, 0));
        assert_eq!(events[1].timestamp, ts(10, 0, 0));
    }

    #[test]
    fn events_sixty_seconds_apart_are_distinct() {
        let sources = HeartbeatSources {
            history: vec![ts(10, 0, 0), ts(10, 1, 0)],
            ..HeartbeatSources::default()
        };
        let events = collect_events(&sources, ts(10, 0, 0) - Duration::hours(24));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn events_older_than_lookback_are_dropped() {
        let now = ts(12, 0, 0);
        let sources = HeartbeatSources {
            history: vec![now - Duration::hours(25)],
            ..HeartbeatSources::default()
        };
        let events = collect_events(&sources, now - Duration::hours(24));
        assert!(events.is_empty());
    }

    #[test]
    fn generates_full_slot_schedule_at_thirty_minutes() {
        let now = ts(12, 0, 0);
        let slots = build_slots(&[], Duration::minutes(30), now);
        assert_eq!(slots.len(), 48);
        assert_eq!(slots[0].slot_time, now);
        for pair in slots.windows(2) {
            assert_eq!(pair[0].slot_time - pair[1].slot_time, Duration::minutes(30));
        }
        assert!(slots.iter().all(|slot| !slot.satisfied));
    }

    #[test]
    fn tolerance_boundary_is_ten_minutes() {
        let now = ts(12, 0, 0);
        let slot_time = now - Duration::minutes(30);

        let just_inside = [HeartbeatEvent {
            timestamp: slot_time - Duration::seconds(599),
            source: HeartbeatSourceKind::History,
        }];
        let slots = build_slots(&just_inside, Duration::minutes(30), now);
        assert!(slots[1].satisfied);

        let just_outside = [HeartbeatEvent {
            timestamp: slot_time - Duration::seconds(601),
            source: HeartbeatSourceKind::History,
        }];
        let slots = build_slots(&just_outside, Duration::minutes(30), now);
        assert!(!slots[1].satisfied);
    }

    #[test]
    fn quiet_hours_report_healthy_even_when_stale() {
        let now = ts(3, 30, 0);
        let sources = HeartbeatSources {
            config: always_active(),
            last_run: Some(now - Duration::hours(5)),
            ..HeartbeatSources::default()
        };
        let result = reconstruct(&sources, now);
        assert_eq!(result.status, ServiceStatus::Healthy);
    }

    #[test]
    fn configured_window_reports_healthy_independently_of_quiet_hours() {
        let now = ts(22, 0, 0);
        let sources = HeartbeatSources {
            config: PresenceConfig {
                active_hours: ActiveHours { start: 7, end: 21 },
                ..PresenceConfig::default()
            },
            last_run: Some(now - Duration::hours(5)),
            ..HeartbeatSources::default()
        };
        let result = reconstruct(&sources, now);
        assert_eq!(result.status, ServiceStatus::Healthy);
    }

    #[test]
    fn stale_cut_is_forty_five_minutes() {
        let now = ts(12, 0, 0);
        let fresh = HeartbeatSources {
            config: always_active(),
            last_run: Some(now - Duration::minutes(44)),
            ..HeartbeatSources::default()
        };
        assert_eq!(reconstruct(&fresh, now).status, ServiceStatus::Healthy);

        let stale = HeartbeatSources {
            config: always_active(),
            last_run: Some(now - Duration::minutes(46)),
            ..HeartbeatSources::default()
        };
        assert_eq!(reconstruct(&stale, now).status, ServiceStatus::Stale);
    }

    #[test]
    fn no_sources_reports_unknown_during_active_hours() {
        let now = ts(12, 0, 0);
        let sources = HeartbeatSources {
            config: always_active(),
            ..HeartbeatSources::default()
        };
        let result = reconstruct(&sources, now);
        assert_eq!(result.status, ServiceStatus::Unknown);
        assert!(result.last_heartbeat.is_none());
    }

    #[test]
    fn last_run_record_is_canonical_for_last_heartbeat() {
        let now = ts(12, 0, 0);
        let sources = HeartbeatSources {
            config: always_active(),
            last_run: Some(now - Duration::minutes(40)),
            history: vec![now - Duration::minutes(10)],
            ..HeartbeatSources::default()
        };
        let result = reconstruct(&sources, now);
        assert_eq!(result.last_heartbeat, Some(now - Duration::minutes(40)));
    }

    #[test]
    fn legacy_state_is_the_final_fallback() {
        let now = ts(12, 0, 0);
        let legacy = now - Duration::hours(30);
        let sources = HeartbeatSources {
            config: always_active(),
            legacy_last_heartbeat: Some(legacy),
            ..HeartbeatSources::default()
        };
        let result = reconstruct(&sources, now);
        assert_eq!(result.last_heartbeat, Some(legacy));
        assert_eq!(result.status, ServiceStatus::Stale);
    }

    #[test]
    fn reconstructed_events_fall_back_when_last_run_is_absent() {
        let now = ts(12, 0, 0);
        let sources = HeartbeatSources {
            config: always_active(),
            history: vec![now - Duration::minutes(35), now - Duration::minutes(5)],
            ..HeartbeatSources::default()
        };
        let result = reconstruct(&sources, now);
        assert_eq!(result.last_heartbeat, Some(now - Duration::minutes(5)));
        assert_eq!(result.status, ServiceStatus::Healthy);
    }

    #[test]
    fn nearby_events_satisfy_their_slots() {
        let now = ts(12, 0, 0);
        let sources = HeartbeatSources {
            config: always_active(),
            history: vec![
                now - Duration::minutes(2),
                now - Duration::minutes(29),
                now - Duration::minutes(63),
            ],
            ..HeartbeatSources::default()
        };
        let result = reconstruct(&sources, now);
        assert!(result.history24h[0].satisfied);
        assert!(result.history24h[1].satisfied);
        assert!(result.history24h[2].satisfied);
        assert!(!result.history24h[3].satisfied);
    }
}
