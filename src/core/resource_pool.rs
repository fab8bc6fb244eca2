//! Generic bounded pool of expensive backend resources.
//!
//! Slots are created lazily up to `max_open`. A checked-out slot is a
//! [`PooledSlot`] guard: dropping it (or passing it to
//! [`ResourcePool::release`]) returns the slot to the idle set on every exit
//! path, including early returns and errors. Slots past `max_lifetime` are
//! discarded rather than recycled, and a reaper trims the idle set down to
//! `max_idle`.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::core::RuntimeError;

/// Creates and health-checks the resources a pool hands out.
#[async_trait]
pub trait Manager: Send + Sync + 'static {
    /// The pooled resource, usually a connection.
    type Resource: Send + 'static;

    /// Open a new resource.
    async fn connect(&self) -> Result<Self::Resource, RuntimeError>;

    /// Cheap liveness check run before an idle slot is reused.
    fn is_healthy(&self, _resource: &Self::Resource) -> bool {
        true
    }
}

/// Capacity limits enforced by a [`ResourcePool`].
#[derive(Debug, Clone)]
pub struct PoolLimits {
    /// Maximum slots open at once.
    pub max_open: usize,
    /// Idle slots kept by eviction.
    pub max_idle: usize,
    /// Age after which a slot is discarded.
    pub max_lifetime: Duration,
    /// Acquisition timeout; zero waits forever.
    pub wait_timeout: Duration,
}

impl From<&PoolConfig> for PoolLimits {
    fn from(cfg: &PoolConfig) -> Self {
        Self {
            max_open: cfg.max_open,
            max_idle: cfg.max_idle,
            max_lifetime: Duration::from_secs(cfg.max_lifetime_secs),
            wait_timeout: cfg.wait_timeout(),
        }
    }
}

/// One backend resource plus its bookkeeping.
#[derive(Debug)]
pub struct Slot<R> {
    /// Pool-unique slot number.
    pub id: u64,
    /// The resource itself.
    pub resource: R,
    /// When the resource was opened.
    pub created_at: Instant,
    /// When the resource was last returned to the pool.
    pub last_used: Instant,
}

impl<R> Slot<R> {
    fn expired(&self, max_lifetime: Duration) -> bool {
        self.created_at.elapsed() > max_lifetime
    }
}

/// Point-in-time pool utilisation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Slots currently open (idle plus checked out).
    pub open: usize,
    /// Slots sitting in the idle set.
    pub idle: usize,
    /// Callers blocked in `acquire`.
    pub waiting: usize,
    /// Slots created over the pool's life.
    pub created: u64,
    /// Slots discarded by lifetime, idle trimming, health checks or invalidation.
    pub evicted: u64,
    /// Acquisitions that failed with `ResourceExhausted`.
    pub exhausted: u64,
}

#[derive(Debug, Default)]
struct PoolCounters {
    open: AtomicUsize,
    waiting: AtomicUsize,
    created: AtomicU64,
    evicted: AtomicU64,
    exhausted: AtomicU64,
}

struct PoolInner<M: Manager> {
    manager: M,
    limits: PoolLimits,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<Slot<M::Resource>>>,
    counters: PoolCounters,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl<M: Manager> PoolInner<M> {
    fn discard(&self, slot: Slot<M::Resource>, reason: &str) {
        self.counters.open.fetch_sub(1, Ordering::AcqRel);
        self.counters.evicted.fetch_add(1, Ordering::Relaxed);
        debug!(slot = slot.id, reason, "pool slot discarded");
    }

    fn return_slot(&self, mut slot: Slot<M::Resource>) {
        if self.closed.load(Ordering::Acquire) {
            self.discard(slot, "pool closed");
            return;
        }
        if slot.expired(self.limits.max_lifetime) {
            self.discard(slot, "lifetime exceeded");
            return;
        }
        slot.last_used = Instant::now();
        self.idle.lock().push_back(slot);
    }
}

/// Bounded pool of resources produced by a [`Manager`].
pub struct ResourcePool<M: Manager> {
    inner: Arc<PoolInner<M>>,
}

impl<M: Manager> Clone for ResourcePool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Outcome of opening a pool against a backend that may be down.
///
/// Dependents match on this instead of propagating an error so that an
/// unreachable backend degrades the subsystem rather than the process.
pub enum PoolInit<M: Manager> {
    /// The backend answered; the pool is usable.
    Ready(ResourcePool<M>),
    /// The first connection failed.
    Unavailable {
        /// Why the first connection failed.
        reason: String,
    },
}

impl<M: Manager> PoolInit<M> {
    /// The pool, if the backend was reachable.
    pub fn ready(self) -> Option<ResourcePool<M>> {
        match self {
            Self::Ready(pool) => Some(pool),
            Self::Unavailable { .. } => None,
        }
    }

    /// Whether the backend was reachable.
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

impl<M: Manager> ResourcePool<M> {
    /// Create an empty pool. No resource is opened until the first `acquire`.
    pub fn new(manager: M, limits: PoolLimits) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                manager,
                permits: Arc::new(Semaphore::new(limits.max_open)),
                limits,
                idle: Mutex::new(VecDeque::new()),
                counters: PoolCounters::default(),
                next_id: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a pool and prove the backend is reachable by opening one slot.
    ///
    /// A failed first connection is logged and reported as
    /// [`PoolInit::Unavailable`].
    pub async fn connect(manager: M, limits: PoolLimits) -> PoolInit<M> {
        let pool = Self::new(manager, limits);
        match pool.acquire().await {
            Ok(slot) => {
                pool.release(slot);
                info!(max_open = pool.inner.limits.max_open, "resource pool ready");
                PoolInit::Ready(pool)
            }
            Err(e) => {
                warn!(error = %e, "backend unavailable; dependent subsystem degraded");
                pool.close();
                PoolInit::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Pool limits.
    pub fn limits(&self) -> &PoolLimits {
        &self.inner.limits
    }

    /// Check out a slot, reusing an idle one when possible.
    ///
    /// # Errors
    ///
    /// - `ResourceExhausted` if no slot frees up within `wait_timeout`
    /// - `Unavailable` if the pool is closed
    /// - whatever the manager returns when opening a new resource fails
    pub async fn acquire(&self) -> Result<PooledSlot<M>, RuntimeError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(RuntimeError::Unavailable("pool closed".into()));
        }

        self.inner.counters.waiting.fetch_add(1, Ordering::AcqRel);
        let permit = self.wait_for_permit().await;
        self.inner.counters.waiting.fetch_sub(1, Ordering::AcqRel);
        let permit = permit?;

        loop {
            let candidate = self.inner.idle.lock().pop_back();
            let Some(slot) = candidate else { break };
            if slot.expired(self.inner.limits.max_lifetime) {
                self.inner.discard(slot, "lifetime exceeded");
                continue;
            }
            if !self.inner.manager.is_healthy(&slot.resource) {
                self.inner.discard(slot, "health check failed");
                continue;
            }
            return Ok(PooledSlot::new(slot, permit, Arc::clone(&self.inner)));
        }

        let resource = self.inner.manager.connect().await?;
        let now = Instant::now();
        let slot = Slot {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            resource,
            created_at: now,
            last_used: now,
        };
        self.inner.counters.open.fetch_add(1, Ordering::AcqRel);
        self.inner.counters.created.fetch_add(1, Ordering::Relaxed);
        debug!(slot = slot.id, "pool slot opened");
        Ok(PooledSlot::new(slot, permit, Arc::clone(&self.inner)))
    }

    async fn wait_for_permit(&self) -> Result<OwnedSemaphorePermit, RuntimeError> {
        let permits = Arc::clone(&self.inner.permits);
        let wait = self.inner.limits.wait_timeout;
        let acquired = if wait.is_zero() {
            permits.acquire_owned().await
        } else {
            match tokio::time::timeout(wait, permits.acquire_owned()).await {
                Ok(result) => result,
                Err(_) => {
                    self.inner.counters.exhausted.fetch_add(1, Ordering::Relaxed);
                    warn!(wait_ms = wait.as_millis(), "pool exhausted");
                    return Err(RuntimeError::ResourceExhausted(format!(
                        "no slot free within {}ms",
                        wait.as_millis()
                    )));
                }
            }
        };
        acquired.map_err(|_| RuntimeError::Unavailable("pool closed".into()))
    }

    /// Return a slot to the pool. Equivalent to dropping the guard.
    pub fn release(&self, slot: PooledSlot<M>) {
        drop(slot);
    }

    /// Remove idle slots past their lifetime, then trim the idle set to
    /// `max_idle`, least recently used first. Returns the number removed.
    pub fn evict(&self) -> usize {
        let removed: Vec<_> = {
            let mut idle = self.inner.idle.lock();
            let max_lifetime = self.inner.limits.max_lifetime;
            let mut removed = Vec::new();
            let mut kept = VecDeque::with_capacity(idle.len());
            for slot in idle.drain(..) {
                if slot.expired(max_lifetime) {
                    removed.push(slot);
                } else {
                    kept.push_back(slot);
                }
            }
            while kept.len() > self.inner.limits.max_idle {
                if let Some(slot) = kept.pop_front() {
                    removed.push(slot);
                }
            }
            *idle = kept;
            removed
        };
        let count = removed.len();
        for slot in removed {
            self.inner.discard(slot, "evicted");
        }
        if count > 0 {
            debug!(count, "evicted idle pool slots");
        }
        count
    }

    /// Drop every idle slot, e.g. after the backend was seen failing.
    pub fn invalidate_idle(&self) -> usize {
        let drained: Vec<_> = self.inner.idle.lock().drain(..).collect();
        let count = drained.len();
        for slot in drained {
            self.inner.discard(slot, "invalidated");
        }
        if count > 0 {
            warn!(count, "pool invalidated");
        }
        count
    }

    /// Start the background eviction task. It stops once every pool handle is dropped.
    pub fn spawn_reaper(&self, every: Duration) -> JoinHandle<()> {
        let weak: Weak<PoolInner<M>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if inner.closed.load(Ordering::Acquire) {
                    break;
                }
                ResourcePool { inner }.evict();
            }
            debug!("pool reaper stopped");
        })
    }

    /// Close the pool: waiters fail, idle slots are dropped, checked-out
    /// slots are discarded when they come back.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.permits.close();
        self.invalidate_idle();
        info!("resource pool closed");
    }

    /// Current utilisation.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let c = &self.inner.counters;
        PoolStats {
            open: c.open.load(Ordering::Acquire),
            idle: self.inner.idle.lock().len(),
            waiting: c.waiting.load(Ordering::Acquire),
            created: c.created.load(Ordering::Relaxed),
            evicted: c.evicted.load(Ordering::Relaxed),
            exhausted: c.exhausted.load(Ordering::Relaxed),
        }
    }
}

/// A checked-out slot. Returned to its pool when dropped.
pub struct PooledSlot<M: Manager> {
    slot: Option<Slot<M::Resource>>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner<M>>,
}

impl<M: Manager> PooledSlot<M> {
    fn new(slot: Slot<M::Resource>, permit: OwnedSemaphorePermit, pool: Arc<PoolInner<M>>) -> Self {
        Self {
            slot: Some(slot),
            permit: Some(permit),
            pool,
        }
    }

    /// Slot number, stable for the resource's life.
    pub fn id(&self) -> u64 {
        self.slot.as_ref().map_or(0, |s| s.id)
    }

    /// Time since the resource was opened.
    pub fn age(&self) -> Duration {
        self.slot
            .as_ref()
            .map_or(Duration::ZERO, |s| s.created_at.elapsed())
    }

    /// Destroy the resource instead of returning it, e.g. after an I/O failure.
    pub fn discard(mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.discard(slot, "discarded by caller");
        }
    }
}

impl<M: Manager> Deref for PooledSlot<M> {
    type Target = M::Resource;

    fn deref(&self) -> &Self::Target {
        match &self.slot {
            Some(slot) => &slot.resource,
            None => unreachable!("slot is only taken on drop or discard"),
        }
    }
}

impl<M: Manager> DerefMut for PooledSlot<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.slot {
            Some(slot) => &mut slot.resource,
            None => unreachable!("slot is only taken on drop or discard"),
        }
    }
}

impl<M: Manager> Drop for PooledSlot<M> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.return_slot(slot);
        }
        // Permit goes back only after the slot is visible in the idle set.
        drop(self.permit.take());
    }
}
