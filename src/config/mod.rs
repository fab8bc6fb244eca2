//! Configuration models for pools, the store, the scheduler, queues and admission.

pub mod pool;
pub mod scheduler;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use pool::{PoolConfig, StoreConfig};
pub use scheduler::{
    parse_times, AdmissionConfig, QueueConfig, RetryPolicy, SchedulerConfig, SupervisorConfig,
    TaskConfig, TIME_OF_DAY_FORMAT,
};

/// Root configuration injected into a host process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Coordination store server settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Pool of client connections to the store.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Scheduler settings, when this process schedules tasks.
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
    /// Job queues drained by this process.
    #[serde(default)]
    pub queues: Vec<QueueConfig>,
    /// Ingress thresholds.
    #[serde(default)]
    pub admission: AdmissionConfig,
    /// Respawn policy.
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

impl RuntimeConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.store.validate().map_err(|e| format!("store invalid: {e}"))?;
        self.pool.validate().map_err(|e| format!("pool invalid: {e}"))?;
        if let Some(scheduler) = &self.scheduler {
            scheduler
                .validate()
                .map_err(|e| format!("scheduler invalid: {e}"))?;
        }
        let mut names = std::collections::HashSet::new();
        for queue in &self.queues {
            queue.validate()?;
            if !names.insert(queue.name.as_str()) {
                return Err(format!("duplicate queue `{}`", queue.name));
            }
        }
        self.admission
            .validate()
            .map_err(|e| format!("admission invalid: {e}"))
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        Self::from_json_str(&raw)
    }
}
