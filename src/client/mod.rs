//! Coordination store client: pooled connections, executors and typed operations.

#[allow(clippy::module_inception)]
mod client;
pub mod connection;
pub mod executor;

pub use client::CoordinationClient;
pub use connection::{StoreConnection, StoreConnector};
pub use executor::{CommandExecutor, RemoteExecutor, ReplyShape};
