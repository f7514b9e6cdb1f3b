// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `gatekeeper` binary as a subprocess against a cache
//! directory the test owns, so a test can stop and restart the process and
//! observe what survived.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use gatekeeper::directory::{AccountEntry, DirectoryFile};

pub use gatekeeper::ensure_crypto;

/// Resolve the path to the compiled `gatekeeper` binary.
pub fn gatekeeper_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("gatekeeper")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Write an accounts file with a master `admin`/`admin-pw` and a regular
/// `family`/`family-pw` login.
pub fn write_accounts_file(dir: &Path) -> anyhow::Result<PathBuf> {
    let file = DirectoryFile {
        accounts: vec![
            AccountEntry::new("acct-admin", "admin", "admin-pw", true),
            AccountEntry::new("acct-family", "family", "family-pw", false),
        ],
        profiles: vec![],
    };
    let path = dir.join("accounts.json");
    std::fs::write(&path, serde_json::to_string_pretty(&file)?)?;
    Ok(path)
}

/// A running `gatekeeper` process that is killed on drop.
pub struct GatekeeperProcess {
    child: Child,
    port: u16,
}

impl GatekeeperProcess {
    /// Spawn gatekeeper with its cache under `cache_dir`.
    pub fn start(cache_dir: &Path, accounts_file: &Path) -> anyhow::Result<Self> {
        ensure_crypto();
        let binary = gatekeeper_binary();
        anyhow::ensure!(binary.exists(), "gatekeeper binary not found at {}", binary.display());

        let port = free_port()?;
        let child = Command::new(&binary)
            .args(["--host", "127.0.0.1", "--port", &port.to_string()])
            .arg("--cache-dir")
            .arg(cache_dir)
            .arg("--accounts-file")
            .arg(accounts_file)
            .args(["--log-format", "text", "--log-level", "warn"])
            // Never reach real providers from tests.
            .env("GATEKEEPER_TRAKT_BASE_URL", "http://127.0.0.1:9")
            .env("GATEKEEPER_PLEX_BASE_URL", "http://127.0.0.1:9")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL for HTTP requests.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Poll health until responsive.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/api/health", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("gatekeeper did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Log in and return the session token from the `Set-Cookie` header.
    pub async fn login(&self, username: &str, password: &str) -> anyhow::Result<String> {
        let resp = reqwest::Client::new()
            .post(format!("{}/api/login", self.base_url()))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;
        anyhow::ensure!(resp.status().is_success(), "login failed: {}", resp.status());
        let cookie = resp
            .headers()
            .get(reqwest::header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| anyhow::anyhow!("login returned no cookie"))?;
        cookie
            .split(';')
            .next()
            .and_then(|kv| kv.split_once('='))
            .map(|(_, token)| token.to_owned())
            .ok_or_else(|| anyhow::anyhow!("malformed cookie: {cookie}"))
    }

    /// `GET path` carrying the session cookie.
    pub async fn get_with_session(
        &self,
        path: &str,
        token: &str,
    ) -> anyhow::Result<reqwest::Response> {
        Ok(reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?
            .get(format!("{}{path}", self.base_url()))
            .header(reqwest::header::COOKIE, format!("gatekeeper_session={token}"))
            .send()
            .await?)
    }

    /// `POST /logout` carrying the session cookie.
    pub async fn logout(&self, token: &str) -> anyhow::Result<reqwest::Response> {
        Ok(reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?
            .post(format!("{}/logout", self.base_url()))
            .header(reqwest::header::COOKIE, format!("gatekeeper_session={token}"))
            .send()
            .await?)
    }

    /// Stop the process and wait for it to exit.
    pub fn stop(mut self) -> anyhow::Result<()> {
        self.child.kill()?;
        self.child.wait()?;
        Ok(())
    }
}

impl Drop for GatekeeperProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
