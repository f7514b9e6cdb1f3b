// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `gatekeeper` binary and check
//! which sessions survive a restart.

use std::time::Duration;

use gatekeeper_specs::{write_accounts_file, GatekeeperProcess};

const TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn http_health() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let accounts = write_accounts_file(dir.path())?;
    let gk = GatekeeperProcess::start(&dir.path().join("cache"), &accounts)?;
    gk.wait_healthy(TIMEOUT).await?;

    let resp: serde_json::Value =
        reqwest::get(format!("{}/api/health", gk.base_url())).await?.json().await?;
    assert_eq!(resp["status"], "running");
    assert_eq!(resp["session_count"], 0);
    Ok(())
}

#[tokio::test]
async fn session_survives_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let accounts = write_accounts_file(dir.path())?;
    let cache = dir.path().join("cache");

    let gk = GatekeeperProcess::start(&cache, &accounts)?;
    gk.wait_healthy(TIMEOUT).await?;
    let token = gk.login("family", "family-pw").await?;
    gk.stop()?;

    let gk = GatekeeperProcess::start(&cache, &accounts)?;
    gk.wait_healthy(TIMEOUT).await?;
    let resp = gk.get_with_session("/api/session", &token).await?;
    assert!(resp.status().is_success(), "status {}", resp.status());
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["accountId"], "acct-family");
    assert_eq!(body["isMaster"], false);
    Ok(())
}

#[tokio::test]
async fn master_role_survives_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let accounts = write_accounts_file(dir.path())?;
    let cache = dir.path().join("cache");

    let gk = GatekeeperProcess::start(&cache, &accounts)?;
    gk.wait_healthy(TIMEOUT).await?;
    let admin = gk.login("admin", "admin-pw").await?;
    let family = gk.login("family", "family-pw").await?;
    gk.stop()?;

    let gk = GatekeeperProcess::start(&cache, &accounts)?;
    gk.wait_healthy(TIMEOUT).await?;
    assert_eq!(gk.get_with_session("/admin", &admin).await?.status().as_u16(), 200);

    let resp = gk.get_with_session("/admin", &family).await?;
    assert_eq!(resp.status().as_u16(), 303);
    assert_eq!(
        resp.headers().get(reqwest::header::LOCATION).and_then(|v| v.to_str().ok()),
        Some("/account")
    );
    Ok(())
}

#[tokio::test]
async fn logout_is_persisted() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let accounts = write_accounts_file(dir.path())?;
    let cache = dir.path().join("cache");

    let gk = GatekeeperProcess::start(&cache, &accounts)?;
    gk.wait_healthy(TIMEOUT).await?;
    let token = gk.login("family", "family-pw").await?;
    assert_eq!(gk.logout(&token).await?.status().as_u16(), 303);
    gk.stop()?;

    let gk = GatekeeperProcess::start(&cache, &accounts)?;
    gk.wait_healthy(TIMEOUT).await?;
    let resp = gk.get_with_session("/api/session", &token).await?;
    assert_eq!(resp.status().as_u16(), 401);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn snapshot_is_owner_only() -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir()?;
    let accounts = write_accounts_file(dir.path())?;
    let cache = dir.path().join("cache");

    let gk = GatekeeperProcess::start(&cache, &accounts)?;
    gk.wait_healthy(TIMEOUT).await?;
    gk.login("family", "family-pw").await?;

    let snapshot = cache.join("sessions").join("sessions.json");
    assert_eq!(std::fs::metadata(&snapshot)?.permissions().mode() & 0o777, 0o600);
    assert_eq!(std::fs::metadata(cache.join("sessions"))?.permissions().mode() & 0o777, 0o700);
    Ok(())
}
