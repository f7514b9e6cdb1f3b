// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the gatekeeper server.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "gatekeeper", version, about = "Session and provider credential gate")]
pub struct GatekeeperConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "GATEKEEPER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 7878, env = "GATEKEEPER_PORT")]
    pub port: u16,

    /// Application cache directory. The session snapshot lives under `sessions/`.
    #[arg(long, default_value = ".cache/gatekeeper", env = "GATEKEEPER_CACHE_DIR")]
    pub cache_dir: PathBuf,

    /// Settings file holding linked provider accounts. Defaults to `<cache-dir>/settings.json`.
    #[arg(long, env = "GATEKEEPER_SETTINGS_PATH")]
    pub settings_path: Option<PathBuf>,

    /// JSON file seeding login accounts and profiles.
    #[arg(long, env = "GATEKEEPER_ACCOUNTS_FILE")]
    pub accounts_file: Option<PathBuf>,

    /// Default session lifetime in seconds.
    #[arg(long, default_value_t = 86_400, env = "GATEKEEPER_SESSION_TTL_SECS")]
    pub session_ttl_secs: u64,

    /// "Remember me" session lifetime in seconds.
    #[arg(long, default_value_t = 2_592_000, env = "GATEKEEPER_REMEMBER_TTL_SECS")]
    pub remember_ttl_secs: u64,

    /// Timeout for every outbound provider request, in seconds.
    #[arg(long, default_value_t = 15, env = "GATEKEEPER_PROVIDER_TIMEOUT_SECS")]
    pub provider_timeout_secs: u64,

    /// Refresh access tokens when fewer than this many seconds remain.
    #[arg(long, default_value_t = 3600, env = "GATEKEEPER_REFRESH_THRESHOLD_SECS")]
    pub refresh_threshold_secs: u64,

    /// Base URL of the device-code provider API.
    #[arg(long, default_value = "https://api.trakt.tv", env = "GATEKEEPER_TRAKT_BASE_URL")]
    pub trakt_base_url: String,

    /// Base URL of the PIN provider API.
    #[arg(long, default_value = "https://plex.tv/api/v2", env = "GATEKEEPER_PLEX_BASE_URL")]
    pub plex_base_url: String,

    /// Browser URL where users enter a PIN.
    #[arg(long, default_value = "https://app.plex.tv/auth", env = "GATEKEEPER_PLEX_AUTH_URL")]
    pub plex_auth_url: String,

    /// Client identifier sent to the PIN provider. Generated per process if unset.
    #[arg(long, env = "GATEKEEPER_PLEX_CLIENT_ID")]
    pub plex_client_id: Option<String>,

    /// Product name sent to the PIN provider.
    #[arg(long, default_value = "gatekeeper", env = "GATEKEEPER_PLEX_PRODUCT")]
    pub plex_product: String,

    /// Log format (json or text).
    #[arg(long, default_value = "text", env = "GATEKEEPER_LOG_FORMAT")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "GATEKEEPER_LOG_LEVEL")]
    pub log_level: String,
}

impl GatekeeperConfig {
    /// Build a config with every default applied, rooted at `cache_dir`.
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7878,
            cache_dir: cache_dir.into(),
            settings_path: None,
            accounts_file: None,
            session_ttl_secs: 86_400,
            remember_ttl_secs: 2_592_000,
            provider_timeout_secs: 15,
            refresh_threshold_secs: 3600,
            trakt_base_url: "https://api.trakt.tv".to_owned(),
            plex_base_url: "https://plex.tv/api/v2".to_owned(),
            plex_auth_url: "https://app.plex.tv/auth".to_owned(),
            plex_client_id: None,
            plex_product: "gatekeeper".to_owned(),
            log_format: "text".to_owned(),
            log_level: "info".to_owned(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.session_ttl_secs == 0 {
            anyhow::bail!("--session-ttl-secs must be greater than zero");
        }
        if self.remember_ttl_secs < self.session_ttl_secs {
            anyhow::bail!("--remember-ttl-secs must not be shorter than --session-ttl-secs");
        }
        if self.provider_timeout_secs == 0 {
            anyhow::bail!("--provider-timeout-secs must be greater than zero");
        }
        Ok(())
    }

    /// Path of the persisted session snapshot.
    pub fn session_snapshot_path(&self) -> PathBuf {
        self.cache_dir.join("sessions").join("sessions.json")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.settings_path.clone().unwrap_or_else(|| self.cache_dir.join("settings.json"))
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn remember_ttl(&self) -> Duration {
        Duration::from_secs(self.remember_ttl_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn plex_client_id(&self) -> String {
        self.plex_client_id.clone().unwrap_or_else(|| format!("gatekeeper-{}", uuid::Uuid::new_v4()))
    }
}
