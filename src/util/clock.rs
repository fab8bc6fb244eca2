//! Wall-clock helpers.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::NaiveDateTime;

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Whole seconds since the Unix epoch.
#[must_use]
pub fn now_secs() -> u64 {
    now_ms() / 1000
}

/// Calendar day (`YYYY-MM-DD`, local time) used to partition logs and audit lists.
#[must_use]
pub fn day_partition() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Source of wall-clock readings for schedulers.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;

    /// Local date and time of day.
    fn local_now(&self) -> NaiveDateTime;
}

/// The host's real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        now_ms()
    }

    fn local_now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// A wall clock pinned to `start` that advances with tokio's clock.
///
/// Under a paused tokio runtime it moves only when the runtime's time does,
/// so wall-clock schedules can be driven deterministically.
#[derive(Debug, Clone)]
pub struct TokioClock {
    start: NaiveDateTime,
    start_ms: u64,
    origin: tokio::time::Instant,
}

impl TokioClock {
    /// Clock reading `start` now. Epoch milliseconds treat `start` as UTC.
    #[must_use]
    pub fn starting_at(start: NaiveDateTime) -> Self {
        Self {
            start,
            start_ms: u64::try_from(start.and_utc().timestamp_millis()).unwrap_or(0),
            origin: tokio::time::Instant::now(),
        }
    }

    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        let elapsed = u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.start_ms.saturating_add(elapsed)
    }

    fn local_now(&self) -> NaiveDateTime {
        chrono::Duration::from_std(self.elapsed())
            .ok()
            .and_then(|d| self.start.checked_add_signed(d))
            .unwrap_or(self.start)
    }
}
