//! Operator overrides: runtime patches to a task's schedule.
//!
//! An override is looked up by a hash of task identity and node identity.
//! The scheduler never writes overrides; it only reads and merges them.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::task::{EffectiveSchedule, TaskMode, TaskStatus};
use crate::config::{parse_times, SchedulerConfig};
use crate::core::RuntimeError;

/// Replacement schedule fields for one task on one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRecord {
    /// Only schedulers running in this namespace apply the record.
    pub namespace: String,
    /// Replacement mode.
    #[serde(default)]
    pub mode: Option<TaskMode>,
    /// Replacement delay or period (seconds).
    #[serde(default)]
    pub interval_secs: Option<u64>,
    /// Replacement times of day (`HH:MM:SS`).
    #[serde(default)]
    pub times: Option<Vec<String>>,
    /// Replacement status.
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

/// Lookup key of the override for `task` on `node`: hex SHA-256 of `task@node`.
#[must_use]
pub fn override_key(task: &str, node: &str) -> String {
    let digest = Sha256::digest(format!("{task}@{node}").as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Apply `record` on top of `base`.
///
/// Pure: the result depends only on the arguments, so merging the same record
/// twice gives the same schedule. A record for another namespace, or one
/// whose result would not be runnable, leaves `base` unchanged.
#[must_use]
pub fn merge(
    base: &EffectiveSchedule,
    namespace: &str,
    record: Option<&OverrideRecord>,
) -> EffectiveSchedule {
    let Some(record) = record.filter(|r| r.namespace == namespace) else {
        return base.clone();
    };
    let mut merged = base.clone();
    if let Some(mode) = record.mode {
        merged.mode = mode;
    }
    if let Some(secs) = record.interval_secs {
        merged.interval = Some(Duration::from_secs(secs));
    }
    if let Some(times) = &record.times {
        match parse_times(times) {
            Ok(parsed) => merged.times = parsed,
            Err(_) => return base.clone(),
        }
    }
    if let Some(status) = record.status {
        merged.status = status;
    }
    if merged.is_runnable() {
        merged
    } else {
        base.clone()
    }
}

/// Where the scheduler looks for overrides.
#[async_trait]
pub trait OverrideSource: Send + Sync {
    /// Current override for `task` on `node`, if any.
    async fn lookup(&self, task: &str, node: &str) -> Result<Option<OverrideRecord>, RuntimeError>;
}

/// No overrides ever apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOverrides;

#[async_trait]
impl OverrideSource for NoOverrides {
    async fn lookup(&self, _task: &str, _node: &str) -> Result<Option<OverrideRecord>, RuntimeError> {
        Ok(None)
    }
}

/// In-memory overrides, set programmatically.
#[derive(Debug, Default)]
pub struct StaticOverrides {
    records: Mutex<HashMap<String, OverrideRecord>>,
}

impl StaticOverrides {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the override for `task` on `node`.
    pub fn set(&self, task: &str, node: &str, record: OverrideRecord) {
        self.records.lock().insert(override_key(task, node), record);
    }

    /// Remove the override for `task` on `node`.
    pub fn remove(&self, task: &str, node: &str) -> Option<OverrideRecord> {
        self.records.lock().remove(&override_key(task, node))
    }
}

#[async_trait]
impl OverrideSource for StaticOverrides {
    async fn lookup(&self, task: &str, node: &str) -> Result<Option<OverrideRecord>, RuntimeError> {
        Ok(self.records.lock().get(&override_key(task, node)).cloned())
    }
}

struct CachedOverride {
    modified: SystemTime,
    record: Option<OverrideRecord>,
}

/// Overrides stored as `<dir>/<override_key>.json`.
///
/// Each lookup stats the file; it is re-read only when its modification
/// time changes. A file that fails to parse is logged and treated as absent
/// until it is modified again.
pub struct OverrideFileSource {
    dir: PathBuf,
    cache: Mutex<HashMap<String, CachedOverride>>,
}

impl OverrideFileSource {
    /// Source reading from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Path of the override file for `task` on `node`.
    #[must_use]
    pub fn path_for(&self, task: &str, node: &str) -> PathBuf {
        self.dir.join(format!("{}.json", override_key(task, node)))
    }

    /// Write an override file. Meant for operator tooling and tests.
    ///
    /// # Errors
    ///
    /// `Serialization` or `Io` failures.
    pub async fn write(&self, task: &str, node: &str, record: &OverrideRecord) -> Result<PathBuf, RuntimeError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(task, node);
        tokio::fs::write(&path, serde_json::to_vec_pretty(record)?).await?;
        Ok(path)
    }

    async fn read(path: &Path) -> Option<OverrideRecord> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "override file unreadable");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "override file ignored");
                None
            }
        }
    }
}

#[async_trait]
impl OverrideSource for OverrideFileSource {
    async fn lookup(&self, task: &str, node: &str) -> Result<Option<OverrideRecord>, RuntimeError> {
        let key = override_key(task, node);
        let path = self.dir.join(format!("{key}.json"));
        let modified = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.cache.lock().remove(&key);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(cached) = self.cache.lock().get(&key) {
            if cached.modified == modified {
                return Ok(cached.record.clone());
            }
        }

        let record = Self::read(&path).await;
        debug!(task, node, found = record.is_some(), "override file reloaded");
        self.cache.lock().insert(
            key,
            CachedOverride {
                modified,
                record: record.clone(),
            },
        );
        Ok(record)
    }
}

/// Override source for a scheduler configuration: files under
/// `override_dir` when it is set, otherwise none.
#[must_use]
pub fn configured_source(config: &SchedulerConfig) -> Arc<dyn OverrideSource> {
    match &config.override_dir {
        Some(dir) => {
            debug!(dir = %dir.display(), "reading overrides from files");
            Arc::new(OverrideFileSource::new(dir.clone()))
        }
        None => Arc::new(NoOverrides),
    }
}
