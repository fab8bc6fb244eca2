//! Shared error taxonomy, the generic resource pool and handler registries.

pub mod error;
pub mod registry;
pub mod resource_pool;

pub use error::{AppResult, RuntimeError};
pub use registry::HandlerRegistry;
pub use resource_pool::{
    Manager, PoolInit, PoolLimits, PoolStats, PooledSlot, ResourcePool, Slot,
};
