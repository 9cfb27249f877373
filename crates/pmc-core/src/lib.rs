use chrono::{DateTime, Utc};

pub mod historic_contracts;
pub mod presence_contracts;

/// Time source for everything that buckets, expires, or judges staleness.
/// Computations take a captured `now` so tests can pin the clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
