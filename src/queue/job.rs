//! Job records and the handler interface.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::RuntimeError;
use crate::util::now_ms;

/// A unit of queued work. Moved between lists as a fresh serialized copy,
/// never edited where it lies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueJob {
    /// Unique job id.
    pub id: Uuid,
    /// Name of the registered handler.
    pub handler: String,
    /// Handler input.
    pub payload: serde_json::Value,
    /// When the producer enqueued the job (ms since epoch).
    pub enqueued_at_ms: u64,
    /// Failed attempts so far.
    #[serde(default)]
    pub attempts: u32,
    /// Message of the most recent failure.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl QueueJob {
    /// New job for `handler`, stamped now.
    pub fn new(handler: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            handler: handler.into(),
            payload,
            enqueued_at_ms: now_ms(),
            attempts: 0,
            last_error: None,
        }
    }
}

/// A failed job waiting on the delay list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayedJob {
    /// The job, with its attempt count already bumped.
    pub job: QueueJob,
    /// Earliest promotion back to pending (ms since epoch).
    pub retry_at_ms: u64,
}

/// Audit entry on the day-partitioned done and dead lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    /// The job as it finished.
    pub job: QueueJob,
    /// When it finished (ms since epoch).
    pub finished_at_ms: u64,
}

/// Executes jobs addressed to one handler name.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Process one job. An `Err` or panic sends the job to the delay list.
    async fn handle(&self, job: &QueueJob) -> Result<(), RuntimeError>;
}

struct FnJobHandler<F>(F);

#[async_trait]
impl<F, Fut> JobHandler for FnJobHandler<F>
where
    F: Fn(QueueJob) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), RuntimeError>> + Send + 'static,
{
    async fn handle(&self, job: &QueueJob) -> Result<(), RuntimeError> {
        (self.0)(job.clone()).await
    }
}

/// Wrap an async closure as a registrable job handler.
pub fn job_fn<F, Fut>(f: F) -> Arc<dyn JobHandler>
where
    F: Fn(QueueJob) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), RuntimeError>> + Send + 'static,
{
    Arc::new(FnJobHandler(f))
}
