//! Builders to construct store clients and job queues from configuration.

use std::collections::HashMap;
use std::time::Duration;

use tracing::info;

use crate::client::{CoordinationClient, StoreConnector};
use crate::config::{PoolConfig, QueueConfig};
use crate::core::{HandlerRegistry, PoolInit, PoolLimits, ResourcePool, RuntimeError};
use crate::queue::{JobHandler, JobQueue};

/// Open a pool of connections to the store at `addr` and start its reaper.
///
/// An unreachable store is not an error: it comes back as
/// [`PoolInit::Unavailable`] so the caller can run degraded.
///
/// # Errors
///
/// `InvalidConfig` when the pool configuration is invalid.
pub async fn build_store_pool(addr: &str, cfg: &PoolConfig) -> Result<PoolInit<StoreConnector>, RuntimeError> {
    cfg.validate()
        .map_err(|e| RuntimeError::InvalidConfig(format!("pool invalid: {e}")))?;
    let init = ResourcePool::connect(StoreConnector::new(addr), PoolLimits::from(cfg)).await;
    if let PoolInit::Ready(pool) = &init {
        pool.spawn_reaper(Duration::from_millis(cfg.reap_interval_ms));
    }
    Ok(init)
}

/// Pooled client of the store at `addr`, or `None` when it is unreachable.
///
/// # Errors
///
/// `InvalidConfig` when the pool configuration is invalid.
pub async fn build_client(addr: &str, cfg: &PoolConfig) -> Result<Option<CoordinationClient>, RuntimeError> {
    Ok(build_store_pool(addr, cfg)
        .await?
        .ready()
        .map(CoordinationClient::remote))
}

/// Build one job queue per configuration entry, sharing `client` and `handlers`.
///
/// # Errors
///
/// `InvalidConfig` for an invalid or duplicate queue.
pub fn build_queues(
    cfgs: &[QueueConfig],
    client: &CoordinationClient,
    handlers: &HandlerRegistry<dyn JobHandler>,
) -> Result<HashMap<String, JobQueue>, RuntimeError> {
    let mut queues = HashMap::with_capacity(cfgs.len());
    for cfg in cfgs {
        if queues.contains_key(&cfg.name) {
            return Err(RuntimeError::InvalidConfig(format!("duplicate queue `{}`", cfg.name)));
        }
        let queue = JobQueue::new(cfg.clone(), client.clone(), handlers.clone())?;
        info!(queue = %cfg.name, max_concurrency = cfg.max_concurrency, "job queue built");
        queues.insert(cfg.name.clone(), queue);
    }
    Ok(queues)
}
