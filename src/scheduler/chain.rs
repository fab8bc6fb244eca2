//! One explicit scheduling loop per (task, epoch, revision).
//!
//! The loop checks that it is still current before every run and returns,
//! without touching the task's state, as soon as it is not.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::handler::{TaskContext, TaskHandler};
use super::runtime::TaskTable;
use super::task::{EffectiveSchedule, TaskMode, TaskState, TaskStatus};
use super::timing::{delay_until, next_timing_run};
use crate::core::RuntimeError;
use crate::util::panic_message;

pub(crate) struct Chain {
    pub(crate) table: Arc<TaskTable>,
    pub(crate) task: String,
    pub(crate) epoch: u64,
    pub(crate) revision: u64,
    pub(crate) schedule: EffectiveSchedule,
    pub(crate) handler: Arc<dyn TaskHandler>,
    pub(crate) superseded: watch::Receiver<u64>,
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Chain {
    pub(crate) async fn run(mut self) {
        if self.schedule.status == TaskStatus::Disabled {
            self.terminate().await;
            info!(task = %self.task, revision = self.revision, "task disabled");
            return;
        }

        match self.schedule.mode {
            TaskMode::Once => {
                if self.alive().await {
                    self.execute().await;
                    self.terminate().await;
                }
            }
            TaskMode::Loop => {
                let Some(delay) = self.schedule.interval else { return };
                loop {
                    if !self.alive().await {
                        return;
                    }
                    self.execute().await;
                    self.scheduled(self.now_ms().saturating_add(millis(delay))).await;
                    if !self.wait(delay).await {
                        return;
                    }
                }
            }
            TaskMode::Interval => {
                let Some(period) = self.schedule.interval else { return };
                // Wall time of each fire follows the ticker's deadlines, not the run lengths.
                let anchor = Instant::now();
                let anchor_ms = self.now_ms();
                let mut deadline = anchor + period;
                let mut ticker = tokio::time::interval_at(deadline, period);
                loop {
                    self.scheduled(anchor_ms.saturating_add(millis(deadline - anchor))).await;
                    tokio::select! {
                        fired = ticker.tick() => deadline = fired + period,
                        _ = self.superseded.changed() => return,
                    }
                    if !self.alive().await {
                        return;
                    }
                    self.execute().await;
                }
            }
            TaskMode::Timing => loop {
                let now = self.table.clock.local_now();
                let Some(next) = next_timing_run(&self.schedule.times, now) else { return };
                let delay = delay_until(next, now);
                self.scheduled(self.now_ms().saturating_add(millis(delay))).await;
                if !self.wait(delay).await || !self.alive().await {
                    return;
                }
                self.execute().await;
            },
        }
    }

    fn now_ms(&self) -> u64 {
        self.table.clock.now_ms()
    }

    async fn alive(&self) -> bool {
        self.table.is_current(&self.task, self.epoch, self.revision).await
    }

    /// Sleep for `delay`; false if the chain was superseded meanwhile.
    async fn wait(&mut self, delay: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            _ = self.superseded.changed() => false,
        }
    }

    async fn scheduled(&self, next_run_ms: u64) {
        let updated = self.table.update(&self.task, self.epoch, self.revision, |d| {
            d.state = TaskState::Scheduled;
            d.next_run_ms = Some(next_run_ms);
        });
        if let Some(descriptor) = updated {
            self.table.persist(&descriptor).await;
        }
    }

    async fn terminate(&self) {
        let updated = self.table.update(&self.task, self.epoch, self.revision, |d| {
            d.state = TaskState::Terminated;
            d.next_run_ms = None;
        });
        if let Some(descriptor) = updated {
            self.table.persist(&descriptor).await;
        }
    }

    async fn execute(&self) {
        let started = self.now_ms();
        let Some(running) = self.table.start_run(&self.task, self.epoch, self.revision, started) else {
            return;
        };
        self.table.persist(&running).await;

        let ctx = TaskContext {
            task: self.task.clone(),
            node_id: self.table.node_id.clone(),
            epoch: self.epoch,
            revision: self.revision,
            run: running.run_count + 1,
            client: self.table.client.clone(),
        };
        let failure = match AssertUnwindSafe(self.handler.run(ctx)).catch_unwind().await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(RuntimeError::TaskExecution(e.to_string())),
            Err(panic) => Some(RuntimeError::TaskExecution(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };
        match &failure {
            Some(e) => error!(task = %self.task, epoch = self.epoch, error = %e, "task run failed"),
            None => debug!(task = %self.task, epoch = self.epoch, "task run completed"),
        }

        // Counted even if the chain was superseded mid-run: the handler did run.
        let failure = failure.map(|e| e.to_string());
        let finished = self.table.finish_run(&self.task, self.epoch, self.revision, failure);
        if let Some(descriptor) = finished {
            self.table.persist(&descriptor).await;
        }
    }
}
