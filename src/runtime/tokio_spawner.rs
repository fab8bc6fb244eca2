//! Tokio runtime spawner implementation.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use super::Spawn;

/// Tokio-based spawner that runs scheduler chains and queue jobs on a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioSpawner {
    handle: Arc<tokio::runtime::Handle>,
}

impl TokioSpawner {
    /// Create a new `TokioSpawner` from a tokio runtime handle.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Spawner bound to the runtime the caller is running on.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(fut)
    }
}
