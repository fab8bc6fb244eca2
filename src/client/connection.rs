//! One TCP connection to the coordination store, and the pool manager that opens them.

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::core::{Manager, RuntimeError};
use crate::store::{decode, encode_command, Reply};

/// A request/reply connection speaking the store's wire protocol.
///
/// After any I/O or protocol failure the connection marks itself broken and
/// the pool's health check refuses to hand it out again.
#[derive(Debug)]
pub struct StoreConnection {
    stream: TcpStream,
    inbound: BytesMut,
    outbound: BytesMut,
    broken: bool,
}

impl StoreConnection {
    /// Open a connection to `addr`.
    ///
    /// # Errors
    ///
    /// `Unavailable` when the store cannot be reached.
    pub async fn connect(addr: &str) -> Result<Self, RuntimeError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| RuntimeError::Unavailable(format!("{addr}: {e}")))?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            inbound: BytesMut::with_capacity(4096),
            outbound: BytesMut::with_capacity(512),
            broken: false,
        })
    }

    /// Send one command and read its reply.
    ///
    /// Error replies from the store come back as `Ok(Reply::Error(..))`;
    /// only transport and framing failures are `Err`.
    ///
    /// # Errors
    ///
    /// `Io`, `Protocol`, or `Unavailable` when the store closed the socket.
    pub async fn call<S: AsRef<str> + Sync>(&mut self, args: &[S]) -> Result<Reply, RuntimeError> {
        let result = self.round_trip(args).await;
        if result.is_err() {
            self.broken = true;
        }
        result
    }

    async fn round_trip<S: AsRef<str> + Sync>(&mut self, args: &[S]) -> Result<Reply, RuntimeError> {
        self.outbound.clear();
        encode_command(args, &mut self.outbound);
        self.stream.write_all(&self.outbound).await?;
        loop {
            if let Some(reply) = decode(&mut self.inbound)? {
                return Ok(reply);
            }
            if self.stream.read_buf(&mut self.inbound).await? == 0 {
                return Err(RuntimeError::Unavailable("store closed the connection".into()));
            }
        }
    }

    /// Whether a previous call failed on this connection.
    #[must_use]
    pub const fn is_broken(&self) -> bool {
        self.broken
    }
}

/// Pool manager producing [`StoreConnection`]s to one address.
#[derive(Debug, Clone)]
pub struct StoreConnector {
    addr: String,
    connect_timeout: Duration,
}

impl StoreConnector {
    /// Connector for `addr` with a 5 second connect timeout.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Override the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Target address.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Manager for StoreConnector {
    type Resource = StoreConnection;

    async fn connect(&self) -> Result<StoreConnection, RuntimeError> {
        tokio::time::timeout(self.connect_timeout, StoreConnection::connect(&self.addr))
            .await
            .map_err(|_| {
                RuntimeError::Unavailable(format!(
                    "{}: connect timed out after {}ms",
                    self.addr,
                    self.connect_timeout.as_millis()
                ))
            })?
    }

    fn is_healthy(&self, resource: &StoreConnection) -> bool {
        !resource.is_broken()
    }
}
