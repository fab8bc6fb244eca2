//! Tests for utility functions

use std::time::Duration;

use chrono::NaiveDate;
use host_substrate::util::{day_partition, now_ms, now_secs, panic_message, Clock, SystemClock, TokioClock};

#[test]
fn test_day_partition_format() {
    let day = day_partition();
    assert!(chrono::NaiveDate::parse_from_str(&day, "%Y-%m-%d").is_ok(), "{day}");
}

#[test]
fn test_clock_units_agree() {
    let secs = now_secs();
    let ms = now_ms();
    assert!(ms / 1000 >= secs);
    assert!(ms / 1000 - secs <= 1);
}

#[test]
fn test_panic_message_from_payload() {
    let payload = std::panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
    assert_eq!(panic_message(payload.as_ref()), "boom 7");
}

#[test]
fn test_system_clock_tracks_host_time() {
    let before = now_ms();
    let reading = SystemClock.now_ms();
    assert!(reading >= before);
    assert!(reading - before < 1000);
}

#[tokio::test(start_paused = true)]
async fn test_tokio_clock_follows_paused_time() {
    let start = NaiveDate::from_ymd_opt(2026, 3, 10)
        .unwrap()
        .and_hms_opt(23, 59, 30)
        .unwrap();
    let clock = TokioClock::starting_at(start);
    let start_ms = clock.now_ms();
    assert_eq!(clock.local_now(), start);

    tokio::time::sleep(Duration::from_secs(45)).await;
    assert_eq!(clock.now_ms() - start_ms, 45_000);
    assert_eq!(
        clock.local_now(),
        NaiveDate::from_ymd_opt(2026, 3, 11)
            .unwrap()
            .and_hms_opt(0, 0, 15)
            .unwrap()
    );
}
