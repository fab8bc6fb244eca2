//! Scheduler, queue, admission and supervisor configuration.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::scheduler::{TaskMode, TaskStatus};

/// Format accepted for TIMING wall-clock entries.
pub const TIME_OF_DAY_FORMAT: &str = "%H:%M:%S";

/// Static descriptor of one schedulable task, as supplied by module configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task identity, unique per node.
    pub name: String,
    /// Name of the registered handler to run.
    pub handler: String,
    /// Scheduling mode.
    pub mode: TaskMode,
    /// Delay (LOOP) or period (INTERVAL) in seconds.
    #[serde(default)]
    pub interval_secs: Option<u64>,
    /// Wall-clock times (`HH:MM:SS`) for TIMING mode.
    #[serde(default)]
    pub times: Vec<String>,
    /// Initial status.
    #[serde(default)]
    pub status: TaskStatus,
}

impl TaskConfig {
    /// Validate that the mode has the parameters it needs.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("task name must not be empty".into());
        }
        if self.handler.trim().is_empty() {
            return Err(format!("task `{}` has no handler", self.name));
        }
        match self.mode {
            TaskMode::Loop | TaskMode::Interval => match self.interval_secs {
                Some(secs) if secs > 0 => {}
                _ => return Err(format!("task `{}` needs interval_secs > 0", self.name)),
            },
            TaskMode::Timing => {
                if self.times.is_empty() {
                    return Err(format!("task `{}` needs at least one time", self.name));
                }
                parse_times(&self.times).map_err(|e| format!("task `{}`: {e}", self.name))?;
            }
            TaskMode::Once => {}
        }
        Ok(())
    }
}

/// Parse `HH:MM:SS` strings, sorted ascending.
pub fn parse_times(times: &[String]) -> Result<Vec<NaiveTime>, String> {
    let mut parsed = times
        .iter()
        .map(|t| {
            NaiveTime::parse_from_str(t.trim(), TIME_OF_DAY_FORMAT)
                .map_err(|e| format!("invalid time `{t}`: {e}"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    parsed.sort_unstable();
    parsed.dedup();
    Ok(parsed)
}

/// Configuration of one scheduling process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Identity of this node; part of every store key and override key.
    pub node_id: String,
    /// Namespace overrides must carry to apply to this scheduler.
    pub namespace: String,
    /// Period of the override re-check (milliseconds).
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Directory holding override JSON documents, read by
    /// `SchedulerRuntime::start_configured`. `None` disables overrides.
    #[serde(default)]
    pub override_dir: Option<PathBuf>,
    /// Tasks registered at start.
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

const fn default_tick_ms() -> u64 {
    1000
}

impl SchedulerConfig {
    /// Validate the scheduler and every task it registers.
    pub fn validate(&self) -> Result<(), String> {
        if self.node_id.trim().is_empty() {
            return Err("node_id must not be empty".into());
        }
        if self.tick_ms == 0 {
            return Err("tick_ms must be greater than 0".into());
        }
        let mut seen = std::collections::HashSet::new();
        for task in &self.tasks {
            task.validate()?;
            if !seen.insert(task.name.as_str()) {
                return Err(format!("duplicate task `{}`", task.name));
            }
        }
        Ok(())
    }

    /// Override re-check period.
    #[must_use]
    pub const fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Retry behaviour of a job queue after a handler failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed before a job is dead-lettered; `None` retries forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Wait before a failed job is promoted back to pending (milliseconds).
    #[serde(default)]
    pub retry_delay_ms: u64,
}

impl RetryPolicy {
    /// Whether a job that has failed `attempts` times gets another try.
    #[must_use]
    pub fn allows_retry(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }
}

/// Configuration of one durable job queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue name; prefix of its store lists.
    pub name: String,
    /// Dispatcher wake-up period (milliseconds).
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Maximum jobs running at once.
    pub max_concurrency: usize,
    /// Failure handling.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl QueueConfig {
    /// Validate queue configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("queue name must not be empty".into());
        }
        if self.max_concurrency == 0 {
            return Err(format!("queue `{}`: max_concurrency must be greater than 0", self.name));
        }
        if self.tick_ms == 0 {
            return Err(format!("queue `{}`: tick_ms must be greater than 0", self.name));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(format!("queue `{}`: max_attempts must be at least 1", self.name));
        }
        Ok(())
    }
}

/// Thresholds of the ingress admission gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Requests admitted per one-second window.
    pub max_requests_per_sec: u64,
    /// Heavy backend operations admitted per one-second window.
    pub max_heavy_per_sec: u64,
    /// Seconds a closed window's counter is kept before it is purged.
    #[serde(default = "default_expire_after_secs")]
    pub expire_after_secs: u64,
}

const fn default_expire_after_secs() -> u64 {
    5
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_requests_per_sec: 1000,
            max_heavy_per_sec: 100,
            expire_after_secs: default_expire_after_secs(),
        }
    }
}

impl AdmissionConfig {
    /// Validate admission thresholds.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_requests_per_sec == 0 || self.max_heavy_per_sec == 0 {
            return Err("admission thresholds must be greater than 0".into());
        }
        Ok(())
    }
}

/// Respawn policy for supervised scheduling processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Give up after this many respawns; `None` respawns forever.
    #[serde(default)]
    pub max_restarts: Option<u32>,
    /// Pause between a crash and the respawn (milliseconds).
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
}

const fn default_restart_delay_ms() -> u64 {
    1000
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_restarts: None,
            restart_delay_ms: default_restart_delay_ms(),
        }
    }
}
