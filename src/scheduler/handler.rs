//! Task handler interface.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::client::CoordinationClient;
use crate::core::RuntimeError;

/// What a handler learns about the run it is executing.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Task identity.
    pub task: String,
    /// Node running the task.
    pub node_id: String,
    /// Manager epoch of the chain.
    pub epoch: u64,
    /// Revision of the chain.
    pub revision: u64,
    /// One-based run number within this registration.
    pub run: u64,
    /// Store client, for handlers that coordinate across processes.
    pub client: CoordinationClient,
}

/// Body of a scheduled task.
///
/// An `Err` or a panic is logged and counted; it does not end the schedule.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Execute one run.
    async fn run(&self, ctx: TaskContext) -> Result<(), RuntimeError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), RuntimeError>> + Send + 'static,
{
    async fn run(&self, ctx: TaskContext) -> Result<(), RuntimeError> {
        (self.0)(ctx).await
    }
}

/// Wrap an async closure as a registrable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn TaskHandler>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), RuntimeError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
