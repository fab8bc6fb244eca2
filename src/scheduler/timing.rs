//! Time-of-day arithmetic for TIMING tasks.

use std::time::Duration;

use chrono::{Days, NaiveDateTime, NaiveTime};

/// The next fire strictly after `now`: the first listed time later today, or
/// the earliest listed time tomorrow when all of today's have passed.
///
/// `times` must be sorted ascending. Returns `None` for an empty list.
#[must_use]
pub fn next_timing_run(times: &[NaiveTime], now: NaiveDateTime) -> Option<NaiveDateTime> {
    let today = now.date();
    if let Some(t) = times.iter().find(|t| **t > now.time()) {
        return Some(today.and_time(*t));
    }
    let first = times.first()?;
    today
        .checked_add_days(Days::new(1))
        .map(|tomorrow| tomorrow.and_time(*first))
}

/// Time to wait from `now` until `target`; zero when `target` has passed.
#[must_use]
pub fn delay_until(target: NaiveDateTime, now: NaiveDateTime) -> Duration {
    (target - now).to_std().unwrap_or(Duration::ZERO)
}
