//! Builders that turn configuration into live components.

pub mod pool_builder;

pub use pool_builder::{build_client, build_queues, build_store_pool};
