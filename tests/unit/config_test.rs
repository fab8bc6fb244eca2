//! Tests for configuration validation

use host_substrate::config::{
    AdmissionConfig, PoolConfig, QueueConfig, RetryPolicy, RuntimeConfig, SchedulerConfig,
    StoreConfig, TaskConfig,
};
use host_substrate::scheduler::{TaskMode, TaskStatus};

fn loop_task(name: &str, interval_secs: Option<u64>) -> TaskConfig {
    TaskConfig {
        name: name.to_string(),
        handler: "noop".to_string(),
        mode: TaskMode::Loop,
        interval_secs,
        times: Vec::new(),
        status: TaskStatus::Enabled,
    }
}

#[test]
fn test_pool_config_validation() {
    assert!(PoolConfig::default().validate().is_ok());
}

#[test]
fn test_pool_config_invalid_max_open() {
    let invalid = PoolConfig {
        max_open: 0,
        max_idle: 0,
        ..PoolConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_idle_above_open() {
    let invalid = PoolConfig {
        max_open: 2,
        max_idle: 3,
        ..PoolConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_store_config_invalid_interval() {
    let invalid = StoreConfig {
        snapshot_interval_secs: 0,
        ..StoreConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_task_config_needs_interval() {
    assert!(loop_task("a", Some(5)).validate().is_ok());
    assert!(loop_task("a", None).validate().is_err());
    assert!(loop_task("a", Some(0)).validate().is_err());
}

#[test]
fn test_timing_task_needs_valid_times() {
    let mut task = loop_task("t", None);
    task.mode = TaskMode::Timing;
    assert!(task.validate().is_err());

    task.times = vec!["25:00:00".to_string()];
    assert!(task.validate().is_err());

    task.times = vec!["09:00:00".to_string(), "21:30:00".to_string()];
    assert!(task.validate().is_ok());
}

#[test]
fn test_scheduler_config_duplicate_tasks() {
    let config = SchedulerConfig {
        node_id: "node-a".to_string(),
        namespace: "prod".to_string(),
        tick_ms: 1000,
        override_dir: None,
        tasks: vec![loop_task("a", Some(1)), loop_task("a", Some(2))],
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_queue_config_zero_attempts() {
    let invalid = QueueConfig {
        name: "mail".to_string(),
        tick_ms: 1000,
        max_concurrency: 4,
        retry: RetryPolicy {
            max_attempts: Some(0),
            retry_delay_ms: 0,
        },
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_retry_policy_limits() {
    let unbounded = RetryPolicy::default();
    assert_eq!(unbounded.max_attempts, None);
    assert_eq!(unbounded.retry_delay_ms, 0);
    assert!(unbounded.allows_retry(1_000));
    let parsed: RetryPolicy = serde_json::from_str("{}").unwrap();
    assert_eq!(parsed, unbounded);

    let bounded = RetryPolicy {
        max_attempts: Some(3),
        retry_delay_ms: 0,
    };
    assert!(bounded.allows_retry(2));
    assert!(!bounded.allows_retry(3));
}

#[test]
fn test_admission_config_zero_threshold() {
    let invalid = AdmissionConfig {
        max_heavy_per_sec: 0,
        ..AdmissionConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_runtime_config_from_json() {
    let json = r#"{
        "pool": { "max_open": 8, "max_idle": 2, "max_lifetime_secs": 600, "wait_timeout_ms": 0 },
        "scheduler": {
            "node_id": "node-a",
            "namespace": "prod",
            "tasks": [
                { "name": "sync", "handler": "sync", "mode": "interval", "interval_secs": 30 },
                { "name": "report", "handler": "report", "mode": "TIMING", "times": ["06:00:00"] }
            ]
        },
        "queues": [ { "name": "mail", "max_concurrency": 4, "retry": { "max_attempts": 5 } } ],
        "admission": { "max_requests_per_sec": 200, "max_heavy_per_sec": 20 }
    }"#;

    let config = RuntimeConfig::from_json_str(json).unwrap();
    assert_eq!(config.pool.max_open, 8);
    assert!(config.pool.wait_timeout().is_zero());
    let scheduler = config.scheduler.unwrap();
    assert_eq!(scheduler.tick_ms, 1000);
    assert_eq!(scheduler.tasks[0].mode, TaskMode::Interval);
    assert_eq!(scheduler.tasks[1].status, TaskStatus::Enabled);
    assert_eq!(config.queues[0].retry.max_attempts, Some(5));
    assert_eq!(config.admission.expire_after_secs, 5);
}

#[test]
fn test_runtime_config_rejects_duplicate_queues() {
    let json = r#"{
        "queues": [
            { "name": "mail", "max_concurrency": 1 },
            { "name": "mail", "max_concurrency": 2 }
        ]
    }"#;
    assert!(RuntimeConfig::from_json_str(json).is_err());
}

#[test]
fn test_runtime_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("host.json");
    std::fs::write(&path, "{}").unwrap();
    let config = RuntimeConfig::from_file(&path).unwrap();
    assert!(config.scheduler.is_none());
    assert_eq!(config.store, StoreConfig::default());

    assert!(RuntimeConfig::from_file(dir.path().join("missing.json")).is_err());
}
