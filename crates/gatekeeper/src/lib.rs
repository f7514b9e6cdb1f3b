// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gatekeeper: first-party login sessions and third-party provider credentials
//! for a self-hosted media server.

pub mod clock;
pub mod config;
pub mod credential;
pub mod directory;
pub mod error;
pub mod persist;
pub mod session;
pub mod state;
pub mod test_support;
pub mod transport;

use std::sync::{Arc, Once};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::GatekeeperConfig;
use crate::state::AppState;
use crate::transport::build_router;

static CRYPTO: Once = Once::new();

/// Install the rustls crypto provider (needed by reqwest even on plain HTTP).
pub fn ensure_crypto() {
    CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Initialize tracing from config.
///
/// Uses `try_init` so it is safe to call more than once.
pub fn init_tracing(config: &GatekeeperConfig) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Run the server until ctrl-c.
pub async fn run(config: GatekeeperConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
            }
            shutdown.cancel();
        });
    }
    serve(config, shutdown).await
}

/// Run the server until `shutdown` fires.
pub async fn serve(config: GatekeeperConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::from_config(config)?);
    let router = build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("gatekeeper listening on {}", listener.local_addr()?);
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;
    Ok(())
}
