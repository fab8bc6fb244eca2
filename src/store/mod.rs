//! The coordination store: an authoritative in-memory key/value engine
//! behind a RESP-compatible wire protocol, snapshotted to disk.

pub mod applog;
pub mod engine;
pub mod protocol;
pub mod server;
pub mod snapshot;
pub mod value;

pub use applog::AppendLog;
pub use engine::Keyspace;
pub use protocol::{decode, decode_command, encode_command, Reply};
pub use server::{spawn_store, StoreHandle, StoreServer};
pub use value::{Entry, Value};
