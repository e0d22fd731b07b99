// SPDX-License-Identifier: MIT OR Apache-2.0
//! `vespid-daemon` binary: load configuration, assemble state, serve.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use vespid_daemon::{AppState, build_app};
use vespid_runs::InMemoryJobQueue;
use vespid_store::memory::InMemoryStore;

#[derive(Debug, Parser)]
#[command(name = "vespid-daemon", about = "Vespid control-plane daemon")]
struct Args {
    /// Listen address override (otherwise `VESPID_LISTEN_ADDR`).
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vespid=debug".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = vespid_config::load_from_env().context("load configuration")?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    for warning in config.validate() {
        warn!(%warning, "configuration warning");
    }

    let state = AppState::new(
        config.clone(),
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryJobQueue::new()),
    )
    .context("assemble application state")?;
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "vespid control plane listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("serve")
}
