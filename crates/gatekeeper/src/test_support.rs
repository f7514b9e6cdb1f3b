// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: scripted provider servers and state builders.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::any;
use axum::{Json, Router};
use parking_lot::Mutex;
use tokio::net::TcpListener;

use crate::clock::Clock;
use crate::config::GatekeeperConfig;
use crate::directory::{AccountEntry, DirectoryFile, Profile, StaticDirectory};
use crate::state::AppState;

/// Scripted replies for one route. The last reply repeats once exhausted.
pub struct MockRoute {
    pub path: &'static str,
    pub replies: Vec<(u16, serde_json::Value)>,
}

impl MockRoute {
    pub fn new(path: &'static str, replies: Vec<(u16, serde_json::Value)>) -> Self {
        Self { path, replies }
    }
}

/// An in-process provider API on an ephemeral port that counts calls per route.
pub struct MockProvider {
    pub addr: SocketAddr,
    calls: Arc<Mutex<HashMap<&'static str, u32>>>,
}

impl MockProvider {
    pub async fn start(routes: Vec<MockRoute>) -> anyhow::Result<Self> {
        let calls: Arc<Mutex<HashMap<&'static str, u32>>> = Arc::new(Mutex::new(HashMap::new()));
        let mut app = Router::new();
        for route in routes {
            let path = route.path;
            let replies = Arc::new(route.replies);
            let counter = Arc::clone(&calls);
            app = app.route(
                path,
                any(move || {
                    let replies = Arc::clone(&replies);
                    let counter = Arc::clone(&counter);
                    async move {
                        let idx = {
                            let mut calls = counter.lock();
                            let n = calls.entry(path).or_insert(0);
                            *n += 1;
                            (*n - 1) as usize
                        };
                        let (status, body) = replies
                            .get(idx)
                            .or_else(|| replies.last())
                            .cloned()
                            .unwrap_or((500, serde_json::Value::Null));
                        (
                            StatusCode::from_u16(status)
                                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                            Json(body),
                        )
                    }
                }),
            );
        }

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        Ok(Self { addr, calls })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of requests served for `path` (the route pattern as registered).
    pub fn calls(&self, path: &str) -> u32 {
        self.calls.lock().get(path).copied().unwrap_or(0)
    }
}

/// Two login accounts (master `admin`/`admin-pw`, regular `family`/`family-pw`)
/// and one profile for each, plus one for an unrelated account.
pub fn sample_directory() -> StaticDirectory {
    StaticDirectory::new(DirectoryFile {
        accounts: vec![
            AccountEntry::new("acct-admin", "admin", "admin-pw", true),
            AccountEntry::new("acct-family", "family", "family-pw", false),
            AccountEntry::new("acct-other", "other", "other-pw", false),
        ],
        profiles: vec![
            Profile { id: "prof-admin".into(), account_id: "acct-admin".into(), name: "Admin".into() },
            Profile { id: "prof-family".into(), account_id: "acct-family".into(), name: "Kids".into() },
            Profile { id: "prof-other".into(), account_id: "acct-other".into(), name: "Guest".into() },
        ],
    })
}

/// Config rooted at `dir` with providers pointed at `provider_url`.
pub fn test_config(dir: &Path, provider_url: &str) -> GatekeeperConfig {
    let mut config = GatekeeperConfig::with_cache_dir(dir);
    config.port = 0;
    config.provider_timeout_secs = 5;
    config.trakt_base_url = provider_url.to_owned();
    config.plex_base_url = provider_url.to_owned();
    config.plex_auth_url = format!("{provider_url}/auth");
    config.plex_client_id = Some("test-client".to_owned());
    config
}

pub fn test_state(
    config: GatekeeperConfig,
    directory: Arc<StaticDirectory>,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<AppState>> {
    Ok(Arc::new(AppState::with_directory(config, directory, clock)?))
}
