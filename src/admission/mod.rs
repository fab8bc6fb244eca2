//! Ingress admission gate.
//!
//! Two rolling one-second counters (requests, heavy backend operations) live
//! in a process-local table. A request that would push either counter past
//! its threshold is rejected at once with [`RuntimeError::ServerBusy`]; there
//! is no queueing. Windows are purged a few seconds after they close.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::AdmissionConfig;
use crate::core::RuntimeError;
use crate::util::now_secs;

/// Which rolling counter a check touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Incoming requests.
    Requests,
    /// Operations that hit a heavy shared backend.
    HeavyOps,
}

impl Counter {
    /// Log label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requests => "requests",
            Self::HeavyOps => "heavy_ops",
        }
    }
}

/// Per-second counters keyed by `(counter, window)`.
#[derive(Debug, Default)]
pub struct CounterTable {
    windows: Mutex<HashMap<(Counter, u64), u64>>,
}

impl CounterTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one to `counter` in `window` unless that would exceed `max`.
    /// Returns the new count, or `None` when the limit is already reached.
    pub fn try_increment(&self, counter: Counter, window: u64, max: u64) -> Option<u64> {
        let mut windows = self.windows.lock();
        let count = windows.entry((counter, window)).or_insert(0);
        if *count >= max {
            return None;
        }
        *count += 1;
        Some(*count)
    }

    /// Add `n` to `counter` in `window` without a limit check.
    pub fn add(&self, counter: Counter, window: u64, n: u64) -> u64 {
        let mut windows = self.windows.lock();
        let count = windows.entry((counter, window)).or_insert(0);
        *count = count.saturating_add(n);
        *count
    }

    /// Take one back, e.g. when a later check failed.
    pub fn decrement(&self, counter: Counter, window: u64) {
        if let Some(count) = self.windows.lock().get_mut(&(counter, window)) {
            *count = count.saturating_sub(1);
        }
    }

    /// Current count of `counter` in `window`.
    pub fn get(&self, counter: Counter, window: u64) -> u64 {
        self.windows.lock().get(&(counter, window)).copied().unwrap_or(0)
    }

    /// Drop windows that closed more than `expire_after` seconds before `now`.
    pub fn purge(&self, now: u64, expire_after: u64) -> usize {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|(_, window), _| window.saturating_add(expire_after) >= now);
        before - windows.len()
    }

    /// Windows currently held.
    pub fn len(&self) -> usize {
        self.windows.lock().len()
    }

    /// Whether no window is held.
    pub fn is_empty(&self) -> bool {
        self.windows.lock().is_empty()
    }
}

type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Admission check consulted before work is accepted.
#[derive(Clone)]
pub struct AdmissionGate {
    config: AdmissionConfig,
    table: Arc<CounterTable>,
    clock: Clock,
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("config", &self.config)
            .field("windows", &self.table.len())
            .finish_non_exhaustive()
    }
}

impl AdmissionGate {
    /// Gate over a fresh counter table, using wall-clock seconds.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for zero thresholds.
    pub fn new(config: AdmissionConfig) -> Result<Self, RuntimeError> {
        Self::with_table(config, Arc::new(CounterTable::new()))
    }

    /// Gate over a table shared with other gates in this process.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for zero thresholds.
    pub fn with_table(config: AdmissionConfig, table: Arc<CounterTable>) -> Result<Self, RuntimeError> {
        config.validate().map_err(RuntimeError::InvalidConfig)?;
        Ok(Self {
            config,
            table,
            clock: Arc::new(now_secs),
        })
    }

    /// Replace the seconds clock.
    #[must_use]
    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Fn() -> u64 + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// The shared counter table.
    pub fn table(&self) -> &Arc<CounterTable> {
        &self.table
    }

    const fn limit(&self, counter: Counter) -> u64 {
        match counter {
            Counter::Requests => self.config.max_requests_per_sec,
            Counter::HeavyOps => self.config.max_heavy_per_sec,
        }
    }

    /// Count one unit against `counter` in the current window.
    ///
    /// # Errors
    ///
    /// `ServerBusy` when the window is already full; nothing is counted then.
    pub fn check(&self, counter: Counter) -> Result<u64, RuntimeError> {
        let now = (self.clock)();
        self.table.purge(now, self.config.expire_after_secs);
        let max = self.limit(counter);
        self.table.try_increment(counter, now, max).ok_or_else(|| {
            warn!(counter = counter.as_str(), window = now, max, "admission rejected");
            RuntimeError::ServerBusy
        })
    }

    /// Count a request, and a heavy operation when `heavy` is set.
    ///
    /// # Errors
    ///
    /// `ServerBusy` when either counter is full. A request admitted by the
    /// first counter but refused by the second is uncounted again.
    pub fn admit_request(&self, heavy: bool) -> Result<(), RuntimeError> {
        self.check(Counter::Requests)?;
        if heavy {
            if let Err(e) = self.check(Counter::HeavyOps) {
                self.table.decrement(Counter::Requests, (self.clock)());
                return Err(e);
            }
        }
        Ok(())
    }

    /// Run `work` only when admitted; otherwise reject without polling it.
    ///
    /// # Errors
    ///
    /// `ServerBusy` on rejection, or whatever `work` returns.
    pub async fn admit<F, Fut, T>(&self, heavy: bool, work: F) -> Result<T, RuntimeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RuntimeError>>,
    {
        self.admit_request(heavy)?;
        debug!(heavy, "request admitted");
        work().await
    }
}
