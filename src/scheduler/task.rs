//! Task modes, lifecycle states and the per-task descriptor persisted to the store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::config::{parse_times, TaskConfig, TIME_OF_DAY_FORMAT};
use crate::core::RuntimeError;

/// How a task is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskMode {
    /// Runs exactly once at registration.
    #[serde(alias = "once")]
    Once,
    /// Runs, then waits a fixed delay, forever.
    #[serde(alias = "loop")]
    Loop,
    /// Runs at fixed wall-clock times of day.
    #[serde(alias = "timing")]
    Timing,
    /// Runs on a fixed-rate timer.
    #[serde(alias = "interval")]
    Interval,
}

impl TaskMode {
    /// Wire/store spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Once => "ONCE",
            Self::Loop => "LOOP",
            Self::Timing => "TIMING",
            Self::Interval => "INTERVAL",
        }
    }
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskMode {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ONCE" => Ok(Self::Once),
            "LOOP" => Ok(Self::Loop),
            "TIMING" => Ok(Self::Timing),
            "INTERVAL" => Ok(Self::Interval),
            other => Err(RuntimeError::InvalidConfig(format!("unknown task mode `{other}`"))),
        }
    }
}

/// Operator-controlled switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    /// The task runs on its schedule.
    #[default]
    #[serde(alias = "enabled")]
    Enabled,
    /// The task is registered but never runs.
    #[serde(alias = "disabled")]
    Disabled,
}

impl TaskStatus {
    /// Wire/store spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "ENABLED",
            Self::Disabled => "DISABLED",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ENABLED" => Ok(Self::Enabled),
            "DISABLED" => Ok(Self::Disabled),
            other => Err(RuntimeError::InvalidConfig(format!("unknown task status `{other}`"))),
        }
    }
}

/// Lifecycle of one chain: Registered → Scheduled → Running → {Scheduled | Terminated}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Descriptor created, chain not yet started.
    Registered,
    /// Waiting for the next fire.
    Scheduled,
    /// Handler executing.
    Running,
    /// No further runs will happen for this revision.
    Terminated,
}

impl TaskState {
    /// Store spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Terminated => "terminated",
        }
    }
}

impl FromStr for TaskState {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(Self::Registered),
            "scheduled" => Ok(Self::Scheduled),
            "running" => Ok(Self::Running),
            "terminated" => Ok(Self::Terminated),
            other => Err(RuntimeError::InvalidConfig(format!("unknown task state `{other}`"))),
        }
    }
}

/// The configuration that actually drives a chain: static descriptor plus any override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSchedule {
    /// Scheduling mode.
    pub mode: TaskMode,
    /// Delay (LOOP) or period (INTERVAL).
    pub interval: Option<Duration>,
    /// Sorted times of day (TIMING).
    pub times: Vec<NaiveTime>,
    /// Enabled or disabled.
    pub status: TaskStatus,
}

impl EffectiveSchedule {
    /// Derive the base schedule from static task configuration.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when the mode lacks its parameters.
    pub fn from_config(task: &TaskConfig) -> Result<Self, RuntimeError> {
        task.validate().map_err(RuntimeError::InvalidConfig)?;
        Ok(Self {
            mode: task.mode,
            interval: task.interval_secs.map(Duration::from_secs),
            times: parse_times(&task.times).map_err(RuntimeError::InvalidConfig)?,
            status: task.status,
        })
    }

    /// Whether the mode has what it needs to run.
    #[must_use]
    pub fn is_runnable(&self) -> bool {
        match self.mode {
            TaskMode::Once => true,
            TaskMode::Loop | TaskMode::Interval => self.interval.is_some_and(|d| !d.is_zero()),
            TaskMode::Timing => !self.times.is_empty(),
        }
    }

    fn times_field(&self) -> String {
        self.times
            .iter()
            .map(|t| t.format(TIME_OF_DAY_FORMAT).to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Live view of one registered task, mirrored to the store on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    /// Task identity.
    pub name: String,
    /// Registered handler name.
    pub handler: String,
    /// Schedule from static configuration.
    pub base: EffectiveSchedule,
    /// Schedule after merging the current override.
    pub effective: EffectiveSchedule,
    /// Manager epoch at registration.
    pub epoch: u64,
    /// Bumped each time the effective schedule changes.
    pub revision: u64,
    /// Lifecycle state.
    pub state: TaskState,
    /// Start of the last run (ms since epoch).
    pub last_run_ms: Option<u64>,
    /// Completed handler invocations.
    pub run_count: u64,
    /// Planned start of the next run (ms since epoch).
    pub next_run_ms: Option<u64>,
    /// Whether the handler is executing right now.
    pub is_busy: bool,
    /// Message of the most recent handler failure.
    pub last_error: Option<String>,
}

impl TaskDescriptor {
    /// Fresh descriptor at registration.
    #[must_use]
    pub fn register(name: String, handler: String, base: EffectiveSchedule, epoch: u64) -> Self {
        Self {
            name,
            handler,
            effective: base.clone(),
            base,
            epoch,
            revision: 0,
            state: TaskState::Registered,
            last_run_ms: None,
            run_count: 0,
            next_run_ms: None,
            is_busy: false,
            last_error: None,
        }
    }

    /// Hash fields written to the store.
    #[must_use]
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        let opt = |v: Option<u64>| v.map_or_else(String::new, |v| v.to_string());
        vec![
            ("handler", self.handler.clone()),
            ("epoch", self.epoch.to_string()),
            ("revision", self.revision.to_string()),
            ("mode", self.effective.mode.as_str().to_string()),
            (
                "interval_secs",
                self.effective
                    .interval
                    .map_or_else(String::new, |d| d.as_secs().to_string()),
            ),
            ("times", self.effective.times_field()),
            ("status", self.effective.status.as_str().to_string()),
            ("state", self.state.as_str().to_string()),
            ("last_run", opt(self.last_run_ms)),
            ("run_count", self.run_count.to_string()),
            ("next_run", opt(self.next_run_ms)),
            ("is_busy", if self.is_busy { "1" } else { "0" }.to_string()),
            ("last_error", self.last_error.clone().unwrap_or_default()),
        ]
    }
}

/// A task's status as read back from the store by external tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Registered handler name.
    pub handler: String,
    /// Manager epoch of the chain that last wrote the record.
    pub epoch: u64,
    /// Revision of that chain.
    pub revision: u64,
    /// Effective mode.
    pub mode: TaskMode,
    /// Effective status.
    pub status: TaskStatus,
    /// Lifecycle state.
    pub state: TaskState,
    /// Start of the last run (ms since epoch).
    pub last_run_ms: Option<u64>,
    /// Completed handler invocations.
    pub run_count: u64,
    /// Planned next run (ms since epoch).
    pub next_run_ms: Option<u64>,
    /// Whether the handler was executing at the time of the write.
    pub is_busy: bool,
    /// Most recent handler failure.
    pub last_error: Option<String>,
}

impl TaskRecord {
    /// Parse the hash written by [`TaskDescriptor::to_fields`].
    ///
    /// # Errors
    ///
    /// `Protocol` when a field is missing or malformed.
    pub fn from_fields(fields: &BTreeMap<String, String>) -> Result<Self, RuntimeError> {
        let field = |name: &str| {
            fields
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| RuntimeError::Protocol(format!("task record missing `{name}`")))
        };
        let number = |name: &str| -> Result<u64, RuntimeError> {
            field(name)?
                .parse()
                .map_err(|e| RuntimeError::Protocol(format!("task record `{name}`: {e}")))
        };
        let optional = |name: &str| -> Result<Option<u64>, RuntimeError> {
            match fields.get(name).map(String::as_str) {
                None | Some("") => Ok(None),
                Some(_) => number(name).map(Some),
            }
        };
        let protocol = |e: RuntimeError| RuntimeError::Protocol(e.to_string());
        Ok(Self {
            handler: field("handler")?.to_string(),
            epoch: number("epoch")?,
            revision: number("revision")?,
            mode: field("mode")?.parse().map_err(protocol)?,
            status: field("status")?.parse().map_err(protocol)?,
            state: field("state")?.parse().map_err(protocol)?,
            last_run_ms: optional("last_run")?,
            run_count: number("run_count")?,
            next_run_ms: optional("next_run")?,
            is_busy: field("is_busy")? == "1",
            last_error: fields.get("last_error").filter(|s| !s.is_empty()).cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval_task() -> TaskConfig {
        TaskConfig {
            name: "sync".into(),
            handler: "sync".into(),
            mode: TaskMode::Interval,
            interval_secs: Some(5),
            times: Vec::new(),
            status: TaskStatus::Enabled,
        }
    }

    #[test]
    fn test_mode_parsing_is_case_insensitive() {
        assert_eq!("interval".parse::<TaskMode>().unwrap(), TaskMode::Interval);
        assert_eq!("TIMING".parse::<TaskMode>().unwrap(), TaskMode::Timing);
        assert!("weekly".parse::<TaskMode>().is_err());
        let mode: TaskMode = serde_json::from_str("\"loop\"").unwrap();
        assert_eq!(mode, TaskMode::Loop);
    }

    #[test]
    fn test_descriptor_fields_round_trip_through_record() {
        let base = EffectiveSchedule::from_config(&interval_task()).unwrap();
        let mut desc = TaskDescriptor::register("sync".into(), "sync".into(), base, 3);
        desc.run_count = 4;
        desc.last_run_ms = Some(1_000);
        desc.state = TaskState::Scheduled;

        let fields: BTreeMap<String, String> = desc
            .to_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let record = TaskRecord::from_fields(&fields).unwrap();
        assert_eq!(record.epoch, 3);
        assert_eq!(record.run_count, 4);
        assert_eq!(record.mode, TaskMode::Interval);
        assert_eq!(record.state, TaskState::Scheduled);
        assert_eq!(record.last_run_ms, Some(1_000));
        assert_eq!(record.next_run_ms, None);
        assert!(!record.is_busy);
    }

    #[test]
    fn test_runnable_requires_mode_parameters() {
        let mut schedule = EffectiveSchedule::from_config(&interval_task()).unwrap();
        assert!(schedule.is_runnable());
        schedule.interval = None;
        assert!(!schedule.is_runnable());
        schedule.mode = TaskMode::Once;
        assert!(schedule.is_runnable());
    }
}
