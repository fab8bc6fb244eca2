//! Error types shared by every substrate component.

use thiserror::Error;

/// Errors produced by pools, the coordination store, its client, the
/// scheduler and the job queue.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Pool wait timeout elapsed before a slot became free.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    /// Backend could not be reached at all.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// Malformed command or reply on the wire.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// A scheduled task or queue job handler failed.
    #[error("task execution failed: {0}")]
    TaskExecution(String),
    /// A supervised process died and must be respawned.
    #[error("fatal process error: {0}")]
    Fatal(String),
    /// The admission gate rejected the request.
    #[error("server busy")]
    ServerBusy,
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The store answered with an error reply.
    #[error("backend error: {0}")]
    Backend(String),
    /// Filesystem or socket failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Encoding or decoding of a persisted record failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RuntimeError {
    /// Whether the failure means the underlying connection can no longer be trusted.
    #[must_use]
    pub const fn poisons_connection(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Io(_) | Self::Unavailable(_))
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
