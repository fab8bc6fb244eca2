//! The store process: one command loop plus a TCP front end.
//!
//! Every command, whether it arrives over the wire or from an in-process
//! [`StoreHandle`], is funnelled through one channel into one task that owns
//! the [`Keyspace`]. That task also writes the periodic snapshot, so a
//! snapshot always captures a state between two whole commands.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::applog::AppendLog;
use super::engine::Keyspace;
use super::protocol::{decode_command, Reply};
use super::snapshot;
use crate::config::StoreConfig;
use crate::core::RuntimeError;
use crate::util::now_ms;

struct StoreRequest {
    args: Vec<String>,
    reply: oneshot::Sender<Reply>,
}

/// In-process entry point to a running store's command loop.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreRequest>,
}

impl StoreHandle {
    /// Run one command and wait for its reply.
    ///
    /// # Errors
    ///
    /// `Unavailable` if the command loop has stopped.
    pub async fn execute(&self, args: Vec<String>) -> Result<Reply, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StoreRequest { args, reply })
            .await
            .map_err(|_| RuntimeError::Unavailable("store command loop stopped".into()))?;
        rx.await
            .map_err(|_| RuntimeError::Unavailable("store dropped the command".into()))
    }
}

struct CommandLoop {
    keyspace: Keyspace,
    snapshot_path: Option<PathBuf>,
    snapshot_every: Duration,
}

impl CommandLoop {
    async fn run(mut self, mut rx: mpsc::Receiver<StoreRequest>) {
        let mut ticker = tokio::time::interval(self.snapshot_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        let snapshots = self.snapshot_path.is_some();

        loop {
            tokio::select! {
                request = rx.recv() => match request {
                    Some(request) => self.handle(request),
                    None => break,
                },
                _ = ticker.tick(), if snapshots => {
                    if let Err(e) = self.snapshot() {
                        error!(error = %e, "periodic snapshot failed");
                    }
                }
            }
        }

        if snapshots {
            if let Err(e) = self.snapshot() {
                error!(error = %e, "final snapshot failed");
            }
        }
        info!("store command loop stopped");
    }

    fn handle(&mut self, request: StoreRequest) {
        let is_save = request
            .args
            .first()
            .is_some_and(|name| name.eq_ignore_ascii_case("SAVE"));
        let reply = if is_save {
            match self.snapshot() {
                Ok(true) => Reply::ok(),
                Ok(false) => Reply::err("snapshots are disabled"),
                Err(e) => Reply::err(e.to_string()),
            }
        } else {
            self.keyspace.execute(&request.args, now_ms())
        };
        // Caller may have gone away; the command already took effect.
        let _ = request.reply.send(reply);
    }

    fn snapshot(&mut self) -> Result<bool, RuntimeError> {
        let Some(path) = self.snapshot_path.as_ref() else {
            return Ok(false);
        };
        let entries = self.keyspace.purge_expired(now_ms());
        snapshot::write(path, entries)?;
        debug!(keys = entries.len(), path = %path.display(), "snapshot written");
        Ok(true)
    }
}

/// Load the snapshot (if any), start the command loop and return a handle to it.
///
/// The loop runs until every handle is dropped, then writes a final snapshot.
///
/// # Errors
///
/// `InvalidConfig` for a bad configuration, `Io` when the snapshot or log
/// directory cannot be read.
pub fn spawn_store(config: &StoreConfig) -> Result<StoreHandle, RuntimeError> {
    config.validate().map_err(RuntimeError::InvalidConfig)?;
    let entries = match &config.snapshot_path {
        Some(path) => snapshot::load(path)?,
        None => std::collections::HashMap::new(),
    };
    let mut keyspace = Keyspace::from_entries(entries);
    if let Some(dir) = &config.log_dir {
        keyspace = keyspace.with_logs(AppendLog::open(dir)?);
    }

    let (tx, rx) = mpsc::channel(config.command_buffer);
    let command_loop = CommandLoop {
        keyspace,
        snapshot_path: config.snapshot_path.clone(),
        snapshot_every: Duration::from_secs(config.snapshot_interval_secs),
    };
    tokio::spawn(command_loop.run(rx));
    Ok(StoreHandle { tx })
}

/// TCP front end speaking the wire protocol.
pub struct StoreServer {
    listener: TcpListener,
    handle: StoreHandle,
    connections: Arc<AtomicU64>,
}

impl StoreServer {
    /// Start the command loop and bind the listener.
    ///
    /// # Errors
    ///
    /// Configuration, snapshot loading or bind failures.
    pub async fn bind(config: &StoreConfig) -> Result<Self, RuntimeError> {
        let handle = spawn_store(config)?;
        let listener = TcpListener::bind(&config.bind_addr).await?;
        info!(addr = %listener.local_addr()?, "coordination store listening");
        Ok(Self {
            listener,
            handle,
            connections: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Address actually bound (useful with port 0).
    ///
    /// # Errors
    ///
    /// `Io` if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr, RuntimeError> {
        Ok(self.listener.local_addr()?)
    }

    /// In-process handle to the same command loop.
    #[must_use]
    pub fn handle(&self) -> StoreHandle {
        self.handle.clone()
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handle = self.handle.clone();
                        let connections = Arc::clone(&self.connections);
                        let active = connections.fetch_add(1, Ordering::AcqRel) + 1;
                        debug!(%peer, active, "connection accepted");
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, handle).await {
                                debug!(%peer, error = %e, "connection closed with error");
                            }
                            connections.fetch_sub(1, Ordering::AcqRel);
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }
        info!("coordination store listener stopped");
    }
}

async fn serve_connection(mut stream: TcpStream, handle: StoreHandle) -> Result<(), RuntimeError> {
    let mut inbound = BytesMut::with_capacity(4096);
    let mut outbound = BytesMut::with_capacity(4096);
    loop {
        loop {
            match decode_command(&mut inbound) {
                Ok(Some(args)) => {
                    let reply = handle.execute(args).await?;
                    reply.encode(&mut outbound);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "malformed command; closing connection");
                    Reply::err(format!("Protocol error: {e}")).encode(&mut outbound);
                    stream.write_all(&outbound).await?;
                    return Err(e);
                }
            }
        }
        if !outbound.is_empty() {
            stream.write_all(&outbound).await?;
            outbound.clear();
        }
        if stream.read_buf(&mut inbound).await? == 0 {
            return Ok(());
        }
    }
}
