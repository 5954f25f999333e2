//! The `simulado serve` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use simulado_server::http::{router, AppState};
use simulado_server::identity;

pub async fn execute(config_path: Option<PathBuf>, bind: Option<String>) -> Result<()> {
    let (config, engine) = super::open_engine(config_path)?;
    let resolver = identity::from_config(&config.identity)?;
    let addr = bind.unwrap_or_else(|| config.server.bind.clone());

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let local = listener.local_addr()?;

    tracing::info!(
        addr = %local,
        storage = engine.storage().backend(),
        identity = resolver.name(),
        "simulado API listening"
    );
    println!("Listening on http://{local}");

    let app = router(AppState::new(engine, resolver));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
