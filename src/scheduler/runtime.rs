//! The scheduling process context: manager epoch, task table and override watcher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::chain::Chain;
use super::handler::TaskHandler;
use super::overrides::{configured_source, merge, OverrideRecord, OverrideSource};
use super::task::{EffectiveSchedule, TaskDescriptor, TaskRecord, TaskState};
use crate::client::CoordinationClient;
use crate::config::SchedulerConfig;
use crate::core::{HandlerRegistry, RuntimeError};
use crate::runtime::{Spawn, TokioSpawner};
use crate::util::{Clock, SystemClock};

/// Store key of the manager epoch counter for one node.
#[must_use]
pub fn epoch_key(namespace: &str, node_id: &str) -> String {
    format!("{namespace}:scheduler:epoch:{node_id}")
}

/// Store key of the hash mirroring one task's state.
#[must_use]
pub fn task_key(namespace: &str, node_id: &str, task: &str) -> String {
    format!("{namespace}:scheduler:task:{node_id}:{task}")
}

/// Read a task's state as last written by its scheduler.
///
/// # Errors
///
/// Store failures, or `Protocol` for a malformed record.
pub async fn read_task_state(
    client: &CoordinationClient,
    namespace: &str,
    node_id: &str,
    task: &str,
) -> Result<Option<TaskRecord>, RuntimeError> {
    let fields = client.hgetall(&task_key(namespace, node_id, task)).await?;
    if fields.is_empty() {
        return Ok(None);
    }
    TaskRecord::from_fields(&fields).map(Some)
}

async fn next_epoch(client: &CoordinationClient, namespace: &str, node_id: &str) -> Result<u64, RuntimeError> {
    let raw = client.incr(&epoch_key(namespace, node_id)).await?;
    u64::try_from(raw).map_err(|_| RuntimeError::Protocol(format!("negative manager epoch {raw}")))
}

pub(crate) struct TaskSlot {
    pub(crate) descriptor: TaskDescriptor,
    revision_tx: watch::Sender<u64>,
    /// Revision whose run set `is_busy`.
    busy_revision: Option<u64>,
}

/// State shared between the runtime and every chain it spawned.
pub(crate) struct TaskTable {
    pub(crate) node_id: String,
    pub(crate) namespace: String,
    pub(crate) client: CoordinationClient,
    pub(crate) clock: Arc<dyn Clock>,
    overrides: Arc<dyn OverrideSource>,
    epoch: AtomicU64,
    stopped: AtomicBool,
    tasks: Mutex<HashMap<String, TaskSlot>>,
}

impl TaskTable {
    /// The epoch chains must match: the store's value, or the local one if
    /// the store cannot be read.
    async fn current_epoch(&self) -> u64 {
        let local = self.epoch.load(Ordering::Acquire);
        match self.client.get(&epoch_key(&self.namespace, &self.node_id)).await {
            Ok(Some(raw)) => raw.parse().unwrap_or(local),
            Ok(None) => local,
            Err(e) => {
                warn!(error = %e, "epoch check fell back to local value");
                local
            }
        }
    }

    /// Whether this process still holds `epoch`: not shut down, and no newer
    /// manager has taken the node.
    pub(crate) async fn holds_epoch(&self, epoch: u64) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }
        let current = self.current_epoch().await;
        if current != epoch {
            debug!(epoch, current, "epoch superseded");
            return false;
        }
        true
    }

    /// Whether a chain for `(task, epoch, revision)` may still run.
    pub(crate) async fn is_current(&self, task: &str, epoch: u64, revision: u64) -> bool {
        if !self.holds_epoch(epoch).await {
            info!(task, epoch, "stale chain stopped");
            return false;
        }
        let live = self
            .tasks
            .lock()
            .get(task)
            .is_some_and(|slot| slot.descriptor.epoch == epoch && slot.descriptor.revision == revision);
        if !live {
            debug!(task, epoch, revision, "superseded chain stopped");
        }
        live
    }

    /// Mutate a descriptor if it still belongs to `(epoch, revision)`.
    /// Returns the updated copy for persisting.
    pub(crate) fn update<F>(&self, task: &str, epoch: u64, revision: u64, f: F) -> Option<TaskDescriptor>
    where
        F: FnOnce(&mut TaskDescriptor),
    {
        let mut tasks = self.tasks.lock();
        let slot = tasks.get_mut(task)?;
        if slot.descriptor.epoch != epoch || slot.descriptor.revision != revision {
            return None;
        }
        f(&mut slot.descriptor);
        Some(slot.descriptor.clone())
    }

    /// Mark a run of `revision` as started. `None` once the chain is stale.
    pub(crate) fn start_run(&self, task: &str, epoch: u64, revision: u64, started_ms: u64) -> Option<TaskDescriptor> {
        let mut tasks = self.tasks.lock();
        let slot = tasks.get_mut(task)?;
        if slot.descriptor.epoch != epoch || slot.descriptor.revision != revision {
            return None;
        }
        slot.busy_revision = Some(revision);
        let d = &mut slot.descriptor;
        d.state = TaskState::Running;
        d.is_busy = true;
        d.last_run_ms = Some(started_ms);
        Some(d.clone())
    }

    /// Record the end of a run of `revision`, even if that revision was
    /// superseded while the handler ran. The busy flag is released only by
    /// the run that set it; the lifecycle state only by a live revision.
    pub(crate) fn finish_run(
        &self,
        task: &str,
        epoch: u64,
        revision: u64,
        failure: Option<String>,
    ) -> Option<TaskDescriptor> {
        let mut tasks = self.tasks.lock();
        let slot = tasks.get_mut(task)?;
        if slot.descriptor.epoch != epoch {
            return None;
        }
        if slot.busy_revision == Some(revision) {
            slot.busy_revision = None;
            slot.descriptor.is_busy = false;
        }
        let d = &mut slot.descriptor;
        d.run_count += 1;
        d.last_error = failure;
        if d.revision == revision {
            d.state = TaskState::Scheduled;
        }
        Some(d.clone())
    }

    /// Mirror a descriptor to the store. Failures are logged, not raised.
    ///
    /// Nothing is written once the descriptor's epoch is no longer held, so a
    /// superseded process never overwrites the live manager's record.
    pub(crate) async fn persist(&self, descriptor: &TaskDescriptor) {
        if !self.holds_epoch(descriptor.epoch).await {
            debug!(task = %descriptor.name, epoch = descriptor.epoch, "stale task state not persisted");
            return;
        }
        let key = task_key(&self.namespace, &self.node_id, &descriptor.name);
        let fields = descriptor.to_fields();
        if let Err(e) = self.client.hset(&key, fields.as_slice()).await {
            warn!(task = %descriptor.name, error = %e, "task state not persisted");
        }
    }

    async fn lookup_override(&self, task: &str) -> Option<OverrideRecord> {
        match self.overrides.lookup(task, &self.node_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(task, error = %e, "override lookup failed; using static schedule");
                None
            }
        }
    }
}

struct Registration {
    name: String,
    handler_name: String,
    handler: Arc<dyn TaskHandler>,
    base: EffectiveSchedule,
}

/// One scheduling process.
///
/// Holds the manager epoch obtained at start, the table of registered tasks
/// and the override watcher. Every chain it spawns checks back here before
/// each run; bumping the epoch in the store, superseding a revision or
/// calling [`shutdown`](Self::shutdown) stops chains at their next fire.
pub struct SchedulerRuntime<S = TokioSpawner>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    table: Arc<TaskTable>,
    registrations: Arc<Vec<Registration>>,
    spawner: S,
    tick: Duration,
    watcher: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<S> Clone for SchedulerRuntime<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            registrations: Arc::clone(&self.registrations),
            spawner: self.spawner.clone(),
            tick: self.tick,
            watcher: Arc::clone(&self.watcher),
        }
    }
}

impl SchedulerRuntime<TokioSpawner> {
    /// Start on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// See [`start_with_spawner`](Self::start_with_spawner).
    pub async fn start(
        config: SchedulerConfig,
        client: CoordinationClient,
        handlers: &HandlerRegistry<dyn TaskHandler>,
        overrides: Arc<dyn OverrideSource>,
    ) -> Result<Self, RuntimeError> {
        Self::start_with_spawner(config, client, handlers, overrides, TokioSpawner::current()).await
    }

    /// Start with the override source named by `config.override_dir`.
    ///
    /// # Errors
    ///
    /// See [`start_with_spawner`](Self::start_with_spawner).
    pub async fn start_configured(
        config: SchedulerConfig,
        client: CoordinationClient,
        handlers: &HandlerRegistry<dyn TaskHandler>,
    ) -> Result<Self, RuntimeError> {
        let overrides = configured_source(&config);
        Self::start(config, client, handlers, overrides).await
    }

    /// Start reading wall-clock time from `clock` instead of the host clock.
    ///
    /// # Errors
    ///
    /// See [`start_with_spawner`](Self::start_with_spawner).
    pub async fn start_with_clock(
        config: SchedulerConfig,
        client: CoordinationClient,
        handlers: &HandlerRegistry<dyn TaskHandler>,
        overrides: Arc<dyn OverrideSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RuntimeError> {
        Self::launch(config, client, handlers, overrides, TokioSpawner::current(), clock).await
    }
}

impl<S> SchedulerRuntime<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Resolve every task's handler, take a fresh manager epoch from the
    /// store, register and start every task, then start the override watcher.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for bad task configuration or an unknown handler;
    /// store failures while obtaining the epoch.
    pub async fn start_with_spawner(
        config: SchedulerConfig,
        client: CoordinationClient,
        handlers: &HandlerRegistry<dyn TaskHandler>,
        overrides: Arc<dyn OverrideSource>,
        spawner: S,
    ) -> Result<Self, RuntimeError> {
        Self::launch(config, client, handlers, overrides, spawner, Arc::new(SystemClock)).await
    }

    async fn launch(
        config: SchedulerConfig,
        client: CoordinationClient,
        handlers: &HandlerRegistry<dyn TaskHandler>,
        overrides: Arc<dyn OverrideSource>,
        spawner: S,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RuntimeError> {
        config.validate().map_err(RuntimeError::InvalidConfig)?;
        let registrations = config
            .tasks
            .iter()
            .map(|task| {
                Ok(Registration {
                    name: task.name.clone(),
                    handler_name: task.handler.clone(),
                    handler: handlers.resolve(&task.handler)?,
                    base: EffectiveSchedule::from_config(task)?,
                })
            })
            .collect::<Result<Vec<_>, RuntimeError>>()?;

        let epoch = next_epoch(&client, &config.namespace, &config.node_id).await?;
        let runtime = Self {
            table: Arc::new(TaskTable {
                node_id: config.node_id.clone(),
                namespace: config.namespace.clone(),
                client,
                clock,
                overrides,
                epoch: AtomicU64::new(epoch),
                stopped: AtomicBool::new(false),
                tasks: Mutex::new(HashMap::new()),
            }),
            registrations: Arc::new(registrations),
            spawner,
            tick: config.tick(),
            watcher: Arc::new(Mutex::new(None)),
        };

        for registration in runtime.registrations.iter() {
            runtime.register(registration, epoch).await;
        }
        let watcher = runtime.spawn_watcher();
        *runtime.watcher.lock() = Some(watcher);

        info!(
            node = %config.node_id,
            namespace = %config.namespace,
            epoch,
            tasks = runtime.registrations.len(),
            "scheduler started"
        );
        Ok(runtime)
    }

    async fn register(&self, registration: &Registration, epoch: u64) {
        let record = self.table.lookup_override(&registration.name).await;
        let mut descriptor = TaskDescriptor::register(
            registration.name.clone(),
            registration.handler_name.clone(),
            registration.base.clone(),
            epoch,
        );
        descriptor.effective = merge(&registration.base, &self.table.namespace, record.as_ref());

        let (revision_tx, revision_rx) = watch::channel(descriptor.revision);
        // Replacing the slot drops the previous sender, which wakes and ends the old chain.
        self.table.tasks.lock().insert(
            registration.name.clone(),
            TaskSlot {
                descriptor: descriptor.clone(),
                revision_tx,
                busy_revision: None,
            },
        );
        self.table.persist(&descriptor).await;
        debug!(task = %descriptor.name, epoch, mode = %descriptor.effective.mode, "task registered");
        self.spawn_chain(registration, &descriptor, revision_rx);
    }

    fn spawn_chain(
        &self,
        registration: &Registration,
        descriptor: &TaskDescriptor,
        superseded: watch::Receiver<u64>,
    ) -> JoinHandle<()> {
        let chain = Chain {
            table: Arc::clone(&self.table),
            task: descriptor.name.clone(),
            epoch: descriptor.epoch,
            revision: descriptor.revision,
            schedule: descriptor.effective.clone(),
            handler: Arc::clone(&registration.handler),
            superseded,
        };
        self.spawner.spawn(chain.run())
    }

    fn spawn_watcher(&self) -> JoinHandle<()> {
        let runtime = self.clone();
        self.spawner.spawn(async move {
            let mut ticker = tokio::time::interval(runtime.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if runtime.table.stopped.load(Ordering::Acquire) {
                    break;
                }
                runtime.apply_overrides().await;
            }
            debug!("override watcher stopped");
        })
    }

    /// Merge each task's current override over its static schedule and
    /// re-derive the chain of every task whose effective schedule changed.
    ///
    /// Runs on every scheduler tick; callable directly. Returns how many
    /// chains were re-derived. A process whose epoch was taken over
    /// re-derives nothing.
    pub async fn apply_overrides(&self) -> usize {
        let epoch = self.epoch();
        if !self.table.holds_epoch(epoch).await {
            debug!(node = %self.table.node_id, epoch, "overrides skipped; epoch not held");
            return 0;
        }
        let mut rederived = 0;
        for registration in self.registrations.iter() {
            let record = self.table.lookup_override(&registration.name).await;
            let merged = merge(&registration.base, &self.table.namespace, record.as_ref());
            let replaced = {
                let mut tasks = self.table.tasks.lock();
                let Some(slot) = tasks.get_mut(&registration.name) else {
                    continue;
                };
                if slot.descriptor.effective == merged {
                    None
                } else {
                    slot.descriptor.revision += 1;
                    slot.descriptor.effective = merged;
                    slot.descriptor.state = TaskState::Registered;
                    slot.descriptor.next_run_ms = None;
                    slot.revision_tx.send_replace(slot.descriptor.revision);
                    Some((slot.descriptor.clone(), slot.revision_tx.subscribe()))
                }
            };
            if let Some((descriptor, superseded)) = replaced {
                info!(
                    task = %descriptor.name,
                    revision = descriptor.revision,
                    mode = %descriptor.effective.mode,
                    status = descriptor.effective.status.as_str(),
                    "override applied; chain re-derived"
                );
                self.table.persist(&descriptor).await;
                self.spawn_chain(registration, &descriptor, superseded);
                rederived += 1;
            }
        }
        rederived
    }

    /// Take a new manager epoch and re-register every task under it.
    /// Chains of the previous epoch stop at their next fire.
    ///
    /// # Errors
    ///
    /// Store failures while bumping the epoch.
    pub async fn reload(&self) -> Result<u64, RuntimeError> {
        let epoch = next_epoch(&self.table.client, &self.table.namespace, &self.table.node_id).await?;
        self.table.epoch.store(epoch, Ordering::Release);
        for registration in self.registrations.iter() {
            self.register(registration, epoch).await;
        }
        info!(node = %self.table.node_id, epoch, "scheduler reloaded");
        Ok(epoch)
    }

    /// Stop the watcher and every chain. Runs already in progress finish.
    pub fn shutdown(&self) {
        if self.table.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }
        self.table.tasks.lock().clear();
        info!(node = %self.table.node_id, "scheduler stopped");
    }

    /// Manager epoch taken by this process.
    pub fn epoch(&self) -> u64 {
        self.table.epoch.load(Ordering::Acquire)
    }

    /// Node identity.
    pub fn node_id(&self) -> &str {
        &self.table.node_id
    }

    /// Current view of one task.
    pub fn task_snapshot(&self, task: &str) -> Option<TaskDescriptor> {
        self.table.tasks.lock().get(task).map(|slot| slot.descriptor.clone())
    }

    /// Current view of every task, ordered by name.
    pub fn tasks(&self) -> Vec<TaskDescriptor> {
        let mut all: Vec<_> = self
            .table
            .tasks
            .lock()
            .values()
            .map(|slot| slot.descriptor.clone())
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}
