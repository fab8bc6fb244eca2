//! Coordination store server.
//!
//! Configured from `HOST_STORE_*` environment variables (a `.env` file is
//! honoured); logs through `RUST_LOG`. Runs until Ctrl-C, then forces a
//! final snapshot.

use anyhow::Context;
use host_substrate::config::StoreConfig;
use host_substrate::core::AppResult;
use host_substrate::store::StoreServer;
use host_substrate::util::init_tracing;
use tracing::{error, info};

#[tokio::main]
async fn main() -> AppResult<()> {
    init_tracing(None);
    let config = StoreConfig::from_env()
        .map_err(anyhow::Error::msg)
        .context("invalid store configuration")?;

    let server = StoreServer::bind(&config)
        .await
        .with_context(|| format!("cannot start store on {}", config.bind_addr))?;
    info!(addr = %server.local_addr()?, snapshot = ?config.snapshot_path, "ready");
    let handle = server.handle();

    server
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "cannot listen for shutdown signal");
            }
        })
        .await;

    if config.snapshot_path.is_some() {
        let reply = handle.execute(vec!["SAVE".into()]).await?;
        info!(?reply, "final snapshot");
    }
    info!("shutdown complete");
    Ok(())
}
