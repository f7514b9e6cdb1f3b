// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::GatekeeperConfig;
use crate::credential::broker::CredentialBroker;
use crate::credential::store::FileCredentialStore;
use crate::directory::{AccountDirectory, ProfileDirectory, StaticDirectory, StreamSource};
use crate::session::SessionStore;

/// Shared server state, constructed once at startup and injected into the router.
pub struct AppState {
    pub config: GatekeeperConfig,
    pub sessions: Arc<SessionStore>,
    pub accounts: Arc<dyn AccountDirectory>,
    pub profiles: Arc<dyn ProfileDirectory>,
    pub streams: Arc<dyn StreamSource>,
    pub credentials: Arc<CredentialBroker>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Build state from config: load the accounts file (if any) and restore
    /// persisted sessions.
    pub fn from_config(config: GatekeeperConfig) -> anyhow::Result<Self> {
        let directory = match config.accounts_file {
            Some(ref path) => StaticDirectory::load(path)?,
            None => {
                tracing::warn!("no accounts file configured; logins will be rejected");
                StaticDirectory::default()
            }
        };
        let state = Self::with_directory(config, Arc::new(directory), Arc::new(SystemClock))?;
        let restored = state.sessions.load_from_disk();
        tracing::info!(restored, "session store ready");
        Ok(state)
    }

    /// Build state around an existing directory and clock. Does not read the
    /// session snapshot.
    pub fn with_directory(
        config: GatekeeperConfig,
        directory: Arc<StaticDirectory>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let sessions =
            Arc::new(SessionStore::new(config.session_snapshot_path(), Arc::clone(&clock)));
        let store = Arc::new(FileCredentialStore::new(config.settings_path()));
        let credentials = Arc::new(CredentialBroker::new(&config, store, Arc::clone(&clock))?);
        Ok(Self {
            config,
            sessions,
            accounts: Arc::clone(&directory) as Arc<dyn AccountDirectory>,
            profiles: Arc::clone(&directory) as Arc<dyn ProfileDirectory>,
            streams: directory as Arc<dyn StreamSource>,
            credentials,
            clock,
        })
    }
}
