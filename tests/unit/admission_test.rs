//! Tests for the ingress admission gate

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use host_substrate::admission::{AdmissionGate, Counter, CounterTable};
use host_substrate::config::AdmissionConfig;
use host_substrate::core::RuntimeError;

fn config() -> AdmissionConfig {
    AdmissionConfig {
        max_requests_per_sec: 3,
        max_heavy_per_sec: 1,
        expire_after_secs: 5,
    }
}

#[tokio::test]
async fn test_full_window_rejects_without_running_work() {
    let gate = AdmissionGate::new(config()).unwrap().with_clock(|| 42);
    gate.table().add(Counter::Requests, 42, 3);

    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let result = gate
        .admit(false, || async move {
            flag.store(true, Ordering::Release);
            Ok(())
        })
        .await;

    assert!(matches!(result, Err(RuntimeError::ServerBusy)));
    assert!(!ran.load(Ordering::Acquire));
}

#[tokio::test]
async fn test_admitted_work_runs() {
    let gate = AdmissionGate::new(config()).unwrap().with_clock(|| 7);
    let value = gate.admit(true, || async { Ok(11) }).await.unwrap();
    assert_eq!(value, 11);
    assert_eq!(gate.table().get(Counter::HeavyOps, 7), 1);
}

#[test]
fn test_gates_share_a_table() {
    let table = Arc::new(CounterTable::new());
    let a = AdmissionGate::with_table(config(), Arc::clone(&table)).unwrap().with_clock(|| 1);
    let b = AdmissionGate::with_table(config(), Arc::clone(&table)).unwrap().with_clock(|| 1);

    a.check(Counter::HeavyOps).unwrap();
    assert!(matches!(b.check(Counter::HeavyOps), Err(RuntimeError::ServerBusy)));
}

#[test]
fn test_zero_threshold_rejected() {
    let invalid = AdmissionConfig {
        max_requests_per_sec: 0,
        ..config()
    };
    assert!(matches!(AdmissionGate::new(invalid), Err(RuntimeError::InvalidConfig(_))));
}
