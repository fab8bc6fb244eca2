//! Where store commands actually run.
//!
//! [`CoordinationClient`](super::CoordinationClient) only builds commands and
//! interprets replies; a [`CommandExecutor`] carries them to a store, either
//! across the network through a pool ([`RemoteExecutor`]) or straight into
//! an in-process command loop ([`StoreHandle`]).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::connection::StoreConnector;
use crate::core::{ResourcePool, RuntimeError};
use crate::store::{Reply, StoreHandle};

/// Reply shape a typed operation expects from its command.
///
/// Error replies always match: they are well-formed answers, surfaced by
/// the client as [`RuntimeError::Backend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    /// Any reply.
    Any,
    /// `:n`.
    Integer,
    /// A bulk string or nil.
    OptionalBulk,
    /// An array of bulk strings, or nil.
    Strings,
    /// A status line.
    Status,
}

impl ReplyShape {
    /// Whether `reply` has this shape.
    #[must_use]
    pub fn accepts(self, reply: &Reply) -> bool {
        match (self, reply) {
            (_, Reply::Error(_)) | (Self::Any, _) => true,
            (Self::Integer, Reply::Integer(_))
            | (Self::OptionalBulk, Reply::Bulk(_) | Reply::Nil)
            | (Self::Strings, Reply::Nil)
            | (Self::Status, Reply::Status(_)) => true,
            (Self::Strings, Reply::Array(items)) => items.iter().all(|i| matches!(i, Reply::Bulk(_))),
            _ => false,
        }
    }

    fn check(self, args: &[String], reply: Reply) -> Result<Reply, RuntimeError> {
        if self.accepts(&reply) {
            Ok(reply)
        } else {
            let command = args.first().map_or("", String::as_str);
            Err(RuntimeError::Protocol(format!("unexpected reply to {command}: {reply:?}")))
        }
    }
}

/// Runs one command against a store and returns its raw reply.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute `args` (command name first).
    ///
    /// A reply that does not match `expect` is a `Protocol` error.
    async fn execute(&self, args: Vec<String>, expect: ReplyShape) -> Result<Reply, RuntimeError>;
}

#[async_trait]
impl CommandExecutor for StoreHandle {
    async fn execute(&self, args: Vec<String>, expect: ReplyShape) -> Result<Reply, RuntimeError> {
        let reply = Self::execute(self, args.clone()).await?;
        expect.check(&args, reply)
    }
}

#[async_trait]
impl<T: CommandExecutor + ?Sized> CommandExecutor for Arc<T> {
    async fn execute(&self, args: Vec<String>, expect: ReplyShape) -> Result<Reply, RuntimeError> {
        (**self).execute(args, expect).await
    }
}

/// Executor backed by a pool of TCP connections.
///
/// A failed call is not retried: the connection is destroyed and, if the
/// failure suggests the store itself went away, every idle connection is
/// dropped too so later callers reconnect. A reply of the wrong shape means
/// the stream is out of step with its requests and counts as such a failure.
#[derive(Clone)]
pub struct RemoteExecutor {
    pool: ResourcePool<StoreConnector>,
}

impl RemoteExecutor {
    /// Wrap an existing pool.
    pub const fn new(pool: ResourcePool<StoreConnector>) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub const fn pool(&self) -> &ResourcePool<StoreConnector> {
        &self.pool
    }
}

#[async_trait]
impl CommandExecutor for RemoteExecutor {
    async fn execute(&self, args: Vec<String>, expect: ReplyShape) -> Result<Reply, RuntimeError> {
        let mut conn = self.pool.acquire().await?;
        let result = match conn.call(args.as_slice()).await {
            Ok(reply) => expect.check(&args, reply),
            Err(e) => Err(e),
        };
        match result {
            Ok(reply) => Ok(reply),
            Err(e) => {
                conn.discard();
                if e.poisons_connection() {
                    let dropped = self.pool.invalidate_idle();
                    warn!(
                        command = args.first().map_or("", String::as_str),
                        error = %e,
                        dropped,
                        "store call failed; pool invalidated"
                    );
                }
                Err(e)
            }
        }
    }
}
