//! Resource pool and coordination store configuration structures.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sizing for one bounded resource pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum slots open at once (idle plus checked out).
    pub max_open: usize,
    /// Maximum idle slots kept after eviction.
    pub max_idle: usize,
    /// Slots older than this are discarded instead of reused (seconds).
    pub max_lifetime_secs: u64,
    /// How long `acquire` waits for a free slot; `0` blocks indefinitely (milliseconds).
    #[serde(default)]
    pub wait_timeout_ms: u64,
    /// Interval of the background eviction task (milliseconds).
    #[serde(default = "default_reap_interval_ms")]
    pub reap_interval_ms: u64,
}

const fn default_reap_interval_ms() -> u64 {
    30_000
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open: 16,
            max_idle: 4,
            max_lifetime_secs: 3600,
            wait_timeout_ms: 3000,
            reap_interval_ms: default_reap_interval_ms(),
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_open == 0 {
            return Err("max_open must be greater than 0".into());
        }
        if self.max_idle > self.max_open {
            return Err("max_idle must not exceed max_open".into());
        }
        if self.max_lifetime_secs == 0 {
            return Err("max_lifetime_secs must be greater than 0".into());
        }
        if self.reap_interval_ms == 0 {
            return Err("reap_interval_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Acquisition timeout; `Duration::ZERO` means wait forever.
    #[must_use]
    pub const fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

/// Coordination store server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Address the wire protocol listener binds to.
    pub bind_addr: String,
    /// Snapshot file; `None` keeps the store purely in memory.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    /// Seconds between snapshots.
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,
    /// Root directory of the day-partitioned append-only logs.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Depth of the command channel feeding the single command loop.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

const fn default_snapshot_interval_secs() -> u64 {
    10
}

const fn default_command_buffer() -> usize {
    1024
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:6390".into(),
            snapshot_path: None,
            snapshot_interval_secs: default_snapshot_interval_secs(),
            log_dir: None,
            command_buffer: default_command_buffer(),
        }
    }
}

impl StoreConfig {
    /// Validate store configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.bind_addr.trim().is_empty() {
            return Err("bind_addr must not be empty".into());
        }
        if self.snapshot_interval_secs == 0 {
            return Err("snapshot_interval_secs must be greater than 0".into());
        }
        if self.command_buffer == 0 {
            return Err("command_buffer must be greater than 0".into());
        }
        Ok(())
    }

    /// Build a store configuration from `HOST_STORE_*` environment variables,
    /// loading a `.env` file first when present.
    ///
    /// Recognised variables: `HOST_STORE_BIND`, `HOST_STORE_SNAPSHOT`,
    /// `HOST_STORE_SNAPSHOT_INTERVAL`, `HOST_STORE_LOG_DIR`.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Ok(bind) = std::env::var("HOST_STORE_BIND") {
            cfg.bind_addr = bind;
        }
        if let Ok(path) = std::env::var("HOST_STORE_SNAPSHOT") {
            cfg.snapshot_path = Some(PathBuf::from(path));
        }
        if let Ok(secs) = std::env::var("HOST_STORE_SNAPSHOT_INTERVAL") {
            cfg.snapshot_interval_secs = secs
                .parse()
                .map_err(|e| format!("HOST_STORE_SNAPSHOT_INTERVAL: {e}"))?;
        }
        if let Ok(dir) = std::env::var("HOST_STORE_LOG_DIR") {
            cfg.log_dir = Some(PathBuf::from(dir));
        }
        cfg.validate()?;
        Ok(cfg)
    }
}
