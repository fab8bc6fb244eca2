//! Runtime adapter used by the scheduler and the queue dispatcher to start background work.

pub mod tokio_spawner;

use std::future::Future;

use tokio::task::JoinHandle;

pub use tokio_spawner::TokioSpawner;

/// Abstraction for spawning background work on a runtime.
pub trait Spawn {
    /// Spawn a future and return a handle that resolves when it finishes.
    fn spawn<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static;
}
