//! # Host Substrate
//!
//! Runtime substrate for a multi-process application host: a coordination
//! store, a distributed scheduler and a durable job queue built on it,
//! generic bounded resource pools, and an ingress admission gate.
//!
//! ## Components
//!
//! - **Coordination store** ([`store`]): an authoritative in-memory
//!   key/value engine with string, list, set and hash values plus
//!   day-partitioned append-only logs. It speaks a strict subset of RESP2,
//!   runs every command on one task, and snapshots the whole map to disk on
//!   a fixed interval.
//! - **Coordination client** ([`client`]): typed operations over a bounded
//!   pool of store connections. A failed call invalidates the pool instead
//!   of retrying.
//! - **Scheduler** ([`scheduler`]): ONCE, LOOP, TIMING and INTERVAL tasks.
//!   Each process takes a fresh manager epoch from the store; chains from an
//!   older epoch stop at their next fire. Operator overrides are merged on
//!   every tick.
//! - **Job queue** ([`queue`]): pending and delay lists in the store,
//!   drained by a bounded-concurrency dispatcher with a configurable retry
//!   policy.
//! - **Admission gate** ([`admission`]): rolling per-second counters that
//!   reject work with a distinguishable "server busy" outcome.
//! - **Supervisor** ([`supervisor`]): respawns a dead scheduling process,
//!   which then runs under a fresh epoch.
//!
//! ```rust,ignore
//! use host_substrate::client::CoordinationClient;
//! use host_substrate::config::StoreConfig;
//! use host_substrate::store::spawn_store;
//!
//! let handle = spawn_store(&StoreConfig::default())?;
//! let client = CoordinationClient::local(handle);
//! client.set("greeting", "hello").await?;
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Admission control at ingress.
pub mod admission;
/// Builders to construct clients and queues from configuration.
pub mod builders;
/// Coordination store client.
pub mod client;
/// Configuration models for pools, the store, the scheduler and queues.
pub mod config;
/// Error taxonomy, handler registries and the generic resource pool.
pub mod core;
/// Durable job queue.
pub mod queue;
/// Runtime adapter for spawning background work.
pub mod runtime;
/// Distributed scheduler.
pub mod scheduler;
/// Coordination store server.
pub mod store;
/// Process supervision.
pub mod supervisor;
/// Shared utilities.
pub mod util;
