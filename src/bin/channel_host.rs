// src/bin/channel_host.rs

//! Standalone store host.
//!
//! Usage: `channel-host [SOCKET_PATH]`
//!
//! The socket path falls back to `$CHANNEL_HOST_SOCKET`. Runs until Ctrl-C.
//! Log output is controlled with `RUST_LOG`.

use std::path::PathBuf;

use channel_layer::{HostServer, LayerError, Result};
use tracing_subscriber::EnvFilter;

const SOCKET_ENV: &str = "CHANNEL_HOST_SOCKET";

fn socket_path() -> Result<PathBuf> {
    // ---
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os(SOCKET_ENV))
        .map(PathBuf::from)
        .ok_or_else(|| {
            LayerError::InvalidConfig(format!(
                "usage: channel-host <SOCKET_PATH> (or set {SOCKET_ENV})"
            ))
        })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_thread_names(true)
        .init();

    let path = socket_path()?;
    let server = HostServer::bind(&path)?;
    tracing::info!(socket = %server.socket_path().display(), "channel host running");

    tokio::signal::ctrl_c().await?;

    tracing::info!("interrupt received, shutting down");
    server.shutdown()
}
