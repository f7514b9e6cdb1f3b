// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use gatekeeper::config::GatekeeperConfig;

#[tokio::main]
async fn main() {
    let config = GatekeeperConfig::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    gatekeeper::ensure_crypto();
    gatekeeper::init_tracing(&config);

    if let Err(e) = gatekeeper::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
