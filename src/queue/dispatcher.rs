//! Bounded-concurrency dispatcher draining one queue.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::job::{DelayedJob, JobHandler, JobOutcome, QueueJob};
use crate::client::CoordinationClient;
use crate::config::QueueConfig;
use crate::core::{HandlerRegistry, RuntimeError};
use crate::runtime::{Spawn, TokioSpawner};
use crate::util::{day_partition, now_ms, panic_message};

/// Store key of a queue's pending list.
#[must_use]
pub fn pending_key(queue: &str) -> String {
    format!("queue:{queue}:pending")
}

/// Store key of a queue's delay list.
#[must_use]
pub fn delay_key(queue: &str) -> String {
    format!("queue:{queue}:delay")
}

/// Store key of a queue's completed-job list for `day` (`YYYY-MM-DD`).
#[must_use]
pub fn done_key(queue: &str, day: &str) -> String {
    format!("queue:{queue}:done:{day}")
}

/// Store key of a queue's dead-job list for `day` (`YYYY-MM-DD`).
#[must_use]
pub fn dead_key(queue: &str, day: &str) -> String {
    format!("queue:{queue}:dead:{day}")
}

/// Cumulative dispatcher counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Jobs popped and handed to a handler.
    pub dispatched: u64,
    /// Jobs that completed.
    pub succeeded: u64,
    /// Failed attempts sent to the delay list.
    pub retried: u64,
    /// Jobs moved to the dead list.
    pub dead: u64,
    /// Delayed jobs promoted back to pending.
    pub promoted: u64,
}

#[derive(Debug, Default)]
struct QueueCounters {
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    retried: AtomicU64,
    dead: AtomicU64,
    promoted: AtomicU64,
}

struct QueueInner {
    config: QueueConfig,
    client: CoordinationClient,
    handlers: HandlerRegistry<dyn JobHandler>,
    permits: Arc<Semaphore>,
    counters: QueueCounters,
}

impl QueueInner {
    async fn pop_and_run(&self, _permit: OwnedSemaphorePermit) {
        let raw = match self.client.lpop(&pending_key(&self.config.name)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                warn!(queue = %self.config.name, error = %e, "pop failed");
                return;
            }
        };
        let job: QueueJob = match serde_json::from_str(&raw) {
            Ok(job) => job,
            Err(e) => {
                error!(queue = %self.config.name, error = %e, "undecodable job dropped to dead list");
                self.append_raw(&dead_key(&self.config.name, &day_partition()), &raw).await;
                self.counters.dead.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);

        let outcome = match self.handlers.resolve(&job.handler) {
            Ok(handler) => match AssertUnwindSafe(handler.handle(&job)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(RuntimeError::TaskExecution(format!(
                    "handler panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                debug!(queue = %self.config.name, job = %job.id, "job completed");
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                self.record(&done_key(&self.config.name, &day_partition()), job).await;
            }
            Err(e) => self.fail(job, &e).await,
        }
    }

    async fn fail(&self, mut job: QueueJob, cause: &RuntimeError) {
        job.attempts = job.attempts.saturating_add(1);
        job.last_error = Some(cause.to_string());
        if self.config.retry.allows_retry(job.attempts) {
            warn!(
                queue = %self.config.name,
                job = %job.id,
                attempts = job.attempts,
                error = %cause,
                "job failed; delayed for retry"
            );
            let delayed = DelayedJob {
                retry_at_ms: now_ms().saturating_add(self.config.retry.retry_delay_ms),
                job,
            };
            match serde_json::to_string(&delayed) {
                Ok(raw) => self.append_raw(&delay_key(&self.config.name), &raw).await,
                Err(e) => error!(queue = %self.config.name, error = %e, "delayed job not encodable"),
            }
            self.counters.retried.fetch_add(1, Ordering::Relaxed);
        } else {
            error!(
                queue = %self.config.name,
                job = %job.id,
                attempts = job.attempts,
                error = %cause,
                "job exhausted its retries"
            );
            self.counters.dead.fetch_add(1, Ordering::Relaxed);
            self.record(&dead_key(&self.config.name, &day_partition()), job).await;
        }
    }

    async fn record(&self, key: &str, job: QueueJob) {
        let outcome = JobOutcome {
            job,
            finished_at_ms: now_ms(),
        };
        match serde_json::to_string(&outcome) {
            Ok(raw) => self.append_raw(key, &raw).await,
            Err(e) => error!(queue = %self.config.name, error = %e, "job outcome not encodable"),
        }
    }

    async fn append_raw(&self, key: &str, raw: &str) {
        if let Err(e) = self.client.rpush(key, raw).await {
            error!(queue = %self.config.name, key, error = %e, "job record lost");
        }
    }
}

/// A durable job queue on top of the store's lists.
///
/// Producers [`push`](Self::push) onto the pending list. The dispatcher
/// promotes due delayed jobs, then pops up to `max_concurrency` pending jobs
/// and runs them in parallel. A failed job goes to the delay list and is
/// promoted back on a later sweep until its [`RetryPolicy`] gives up, when it
/// goes to the day's dead list.
///
/// [`RetryPolicy`]: crate::config::RetryPolicy
pub struct JobQueue<S = TokioSpawner>
where
    S: Spawn + Send + Sync + 'static,
{
    inner: Arc<QueueInner>,
    spawner: S,
}

impl JobQueue<TokioSpawner> {
    /// Queue running jobs on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a bad configuration.
    pub fn new(
        config: QueueConfig,
        client: CoordinationClient,
        handlers: HandlerRegistry<dyn JobHandler>,
    ) -> Result<Self, RuntimeError> {
        Self::with_spawner(config, client, handlers, TokioSpawner::current())
    }
}

impl<S> JobQueue<S>
where
    S: Spawn + Send + Sync + 'static,
{
    /// Queue running jobs through `spawner`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a bad configuration.
    pub fn with_spawner(
        config: QueueConfig,
        client: CoordinationClient,
        handlers: HandlerRegistry<dyn JobHandler>,
        spawner: S,
    ) -> Result<Self, RuntimeError> {
        config.validate().map_err(RuntimeError::InvalidConfig)?;
        Ok(Self {
            inner: Arc::new(QueueInner {
                permits: Arc::new(Semaphore::new(config.max_concurrency)),
                config,
                client,
                handlers,
                counters: QueueCounters::default(),
            }),
            spawner,
        })
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Enqueue a new job for `handler`.
    ///
    /// # Errors
    ///
    /// Store or serialization failures.
    pub async fn push(&self, handler: &str, payload: serde_json::Value) -> Result<QueueJob, RuntimeError> {
        let job = QueueJob::new(handler, payload);
        self.push_job(&job).await?;
        Ok(job)
    }

    /// Enqueue an already-built job.
    ///
    /// # Errors
    ///
    /// Store or serialization failures.
    pub async fn push_job(&self, job: &QueueJob) -> Result<(), RuntimeError> {
        let raw = serde_json::to_string(job)?;
        self.inner.client.rpush(&pending_key(self.name()), &raw).await?;
        debug!(queue = %self.name(), job = %job.id, handler = %job.handler, "job enqueued");
        Ok(())
    }

    /// Move delayed jobs whose wait has elapsed back to pending, oldest first.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn promote_due(&self) -> Result<usize, RuntimeError> {
        let client = &self.inner.client;
        let delay = delay_key(self.name());
        let pending = pending_key(self.name());
        let mut promoted = 0;
        loop {
            let head = client.lrange(&delay, 0, 0).await?;
            let Some(raw) = head.first() else { break };
            let now = now_ms();
            match serde_json::from_str::<DelayedJob>(raw) {
                Ok(delayed) if delayed.retry_at_ms > now => break,
                Ok(_) => {}
                Err(e) => warn!(queue = %self.name(), error = %e, "undecodable delayed job dropped"),
            }
            // Another consumer may have taken the head meanwhile; act on what we popped.
            let Some(raw) = client.lpop(&delay).await? else { break };
            let Ok(delayed) = serde_json::from_str::<DelayedJob>(&raw) else {
                client.rpush(&dead_key(self.name(), &day_partition()), &raw).await?;
                continue;
            };
            if delayed.retry_at_ms > now {
                client.rpush(&delay, &raw).await?;
                break;
            }
            client.rpush(&pending, &serde_json::to_string(&delayed.job)?).await?;
            promoted += 1;
        }
        if promoted > 0 {
            self.inner
                .counters
                .promoted
                .fetch_add(u64::try_from(promoted).unwrap_or(u64::MAX), Ordering::Relaxed);
            debug!(queue = %self.name(), promoted, "delayed jobs promoted");
        }
        Ok(promoted)
    }

    /// Jobs ready to run: the pending list (after promotion, due delayed
    /// jobs are part of it).
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn outstanding(&self) -> Result<u64, RuntimeError> {
        self.inner.client.llen(&pending_key(self.name())).await
    }

    /// Jobs waiting on the delay list.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn delayed(&self) -> Result<u64, RuntimeError> {
        self.inner.client.llen(&delay_key(self.name())).await
    }

    /// One dispatcher wake-up: promote due jobs, then start up to
    /// `min(outstanding, free concurrency)` pops in parallel. Returns the
    /// handles of the started pops.
    ///
    /// # Errors
    ///
    /// Store failures while promoting or counting.
    pub async fn dispatch(&self) -> Result<Vec<JoinHandle<()>>, RuntimeError> {
        self.promote_due().await?;
        let outstanding = usize::try_from(self.outstanding().await?).unwrap_or(usize::MAX);
        let slots = outstanding.min(self.inner.permits.available_permits());
        let mut started = Vec::with_capacity(slots);
        for _ in 0..slots {
            let Ok(permit) = Arc::clone(&self.inner.permits).try_acquire_owned() else {
                break;
            };
            let inner = Arc::clone(&self.inner);
            started.push(self.spawner.spawn(async move { inner.pop_and_run(permit).await }));
        }
        if !started.is_empty() {
            debug!(queue = %self.name(), outstanding, started = started.len(), "dispatching");
        }
        Ok(started)
    }

    /// Dispatch once and wait for every started job. Returns how many pops ran.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn sweep(&self) -> Result<usize, RuntimeError> {
        let started = self.dispatch().await?;
        let count = started.len();
        for joined in join_all(started).await {
            if let Err(e) = joined {
                error!(queue = %self.name(), error = %e, "job task aborted");
            }
        }
        Ok(count)
    }

    /// Wake every `tick_ms` and dispatch until `shutdown` resolves.
    /// Jobs already started keep running.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(self.inner.config.tick_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);
        info!(queue = %self.name(), max_concurrency = self.inner.config.max_concurrency, "dispatcher started");
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.dispatch().await {
                        warn!(queue = %self.name(), error = %e, "dispatch failed");
                    }
                }
            }
        }
        info!(queue = %self.name(), "dispatcher stopped");
    }

    /// Cumulative counters.
    pub fn stats(&self) -> QueueStats {
        let c = &self.inner.counters;
        QueueStats {
            dispatched: c.dispatched.load(Ordering::Relaxed),
            succeeded: c.succeeded.load(Ordering::Relaxed),
            retried: c.retried.load(Ordering::Relaxed),
            dead: c.dead.load(Ordering::Relaxed),
            promoted: c.promoted.load(Ordering::Relaxed),
        }
    }
}
