// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;
use tempfile::TempDir;

use super::*;
use crate::clock::ManualClock;
use crate::credential::store::FileCredentialStore;
use crate::session::Session;
use crate::test_support::{test_config, MockProvider, MockRoute};

const NOW: u64 = 1_700_000_000;

struct Harness {
    _dir: TempDir,
    broker: CredentialBroker,
    store: Arc<FileCredentialStore>,
    mock: MockProvider,
}

impl Harness {
    async fn new(routes: Vec<MockRoute>) -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let mock = MockProvider::start(routes).await?;
        let config = test_config(dir.path(), &mock.url());
        let store = Arc::new(FileCredentialStore::new(config.settings_path()));
        let clock = Arc::new(ManualClock::new(NOW * 1000));
        let broker = CredentialBroker::new(&config, store.clone(), clock)?;
        Ok(Self { _dir: dir, broker, store, mock })
    }

    /// A trakt account owned by `acct-1` holding the given credential.
    fn trakt_with(&self, credential: Option<CredentialRecord>) -> anyhow::Result<String> {
        let account = self.broker.create_account(Provider::Trakt, "trakt", "acct-1", "cid", "secret")?;
        if let Some(record) = credential {
            self.store.write_credential(Provider::Trakt, &account.id, record)?;
        }
        Ok(account.id)
    }

    fn credential(&self, provider: Provider, id: &str) -> anyhow::Result<Option<CredentialRecord>> {
        Ok(self.broker.account(provider, id)?.credential)
    }
}

fn record(expires_at: u64, refresh: Option<&str>) -> CredentialRecord {
    CredentialRecord {
        access_token: "old-access".to_owned(),
        refresh_token: refresh.map(str::to_owned),
        expires_at,
        username: "sean".to_owned(),
    }
}

fn refresh_route(status: u16) -> MockRoute {
    let body = if status == 200 {
        json!({"access_token": "new-access", "refresh_token": "new-refresh", "expires_in": 7_776_000})
    } else {
        json!({"error": "invalid_grant"})
    };
    MockRoute::new("/oauth/token", vec![(status, body)])
}

#[tokio::test]
async fn refreshes_once_when_under_threshold() -> anyhow::Result<()> {
    let h = Harness::new(vec![refresh_route(200)]).await?;
    let id = h.trakt_with(Some(record(NOW + 30 * 60, Some("old-refresh"))))?;

    assert_eq!(h.broker.get_valid_access_token(Provider::Trakt, &id).await?, "new-access");
    assert_eq!(h.mock.calls("/oauth/token"), 1);

    let stored = h.credential(Provider::Trakt, &id)?.ok_or_else(|| anyhow::anyhow!("cleared"))?;
    assert_eq!(stored.refresh_token.as_deref(), Some("new-refresh"));
    assert_eq!(stored.expires_at, NOW + 7_776_000);
    assert_eq!(stored.username, "sean");

    // The rotated token is good for months; no further refresh.
    assert_eq!(h.broker.get_valid_access_token(Provider::Trakt, &id).await?, "new-access");
    assert_eq!(h.mock.calls("/oauth/token"), 1);
    Ok(())
}

#[tokio::test]
async fn does_not_refresh_with_two_hours_left() -> anyhow::Result<()> {
    let h = Harness::new(vec![refresh_route(200)]).await?;
    let id = h.trakt_with(Some(record(NOW + 2 * 3600, Some("old-refresh"))))?;

    assert_eq!(h.broker.get_valid_access_token(Provider::Trakt, &id).await?, "old-access");
    assert_eq!(h.mock.calls("/oauth/token"), 0);
    Ok(())
}

#[tokio::test]
async fn expired_without_refresh_token_requires_reauth() -> anyhow::Result<()> {
    let h = Harness::new(vec![refresh_route(200)]).await?;
    let id = h.trakt_with(Some(record(NOW - 60, None)))?;

    let err = h.broker.get_valid_access_token(Provider::Trakt, &id).await.err();
    assert!(matches!(err, Some(CredentialError::ReauthRequired(_))), "{err:?}");
    assert_eq!(h.mock.calls("/oauth/token"), 0);
    Ok(())
}

#[tokio::test]
async fn expiring_without_refresh_token_is_still_usable() -> anyhow::Result<()> {
    let h = Harness::new(vec![]).await?;
    let id = h.trakt_with(Some(record(NOW + 600, None)))?;
    assert_eq!(h.broker.get_valid_access_token(Provider::Trakt, &id).await?, "old-access");
    Ok(())
}

#[tokio::test]
async fn rejected_refresh_clears_credential() -> anyhow::Result<()> {
    let h = Harness::new(vec![refresh_route(400)]).await?;
    let id = h.trakt_with(Some(record(NOW + 60, Some("spent"))))?;

    let err = h.broker.get_valid_access_token(Provider::Trakt, &id).await.err();
    assert!(err.as_ref().is_some_and(CredentialError::is_terminal), "{err:?}");
    assert_eq!(h.credential(Provider::Trakt, &id)?, None);

    let err = h.broker.get_valid_access_token(Provider::Trakt, &id).await.err();
    assert!(matches!(err, Some(CredentialError::ReauthRequired(_))));
    assert_eq!(h.mock.calls("/oauth/token"), 1);
    Ok(())
}

#[tokio::test]
async fn transient_refresh_failure_keeps_credential() -> anyhow::Result<()> {
    let h = Harness::new(vec![refresh_route(503)]).await?;
    let id = h.trakt_with(Some(record(NOW + 60, Some("old-refresh"))))?;

    let err = h.broker.get_valid_access_token(Provider::Trakt, &id).await.err();
    assert!(matches!(err, Some(CredentialError::Transient(_))), "{err:?}");
    assert_eq!(h.credential(Provider::Trakt, &id)?, Some(record(NOW + 60, Some("old-refresh"))));
    Ok(())
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() -> anyhow::Result<()> {
    let h = Harness::new(vec![refresh_route(200)]).await?;
    let id = h.trakt_with(Some(record(NOW + 60, Some("old-refresh"))))?;

    let (a, b, c) = tokio::join!(
        h.broker.get_valid_access_token(Provider::Trakt, &id),
        h.broker.get_valid_access_token(Provider::Trakt, &id),
        h.broker.get_valid_access_token(Provider::Trakt, &id),
    );
    for token in [a?, b?, c?] {
        assert_eq!(token, "new-access");
    }
    assert_eq!(h.mock.calls("/oauth/token"), 1);
    Ok(())
}

#[tokio::test]
async fn disconnected_account_requires_reauth() -> anyhow::Result<()> {
    let h = Harness::new(vec![]).await?;
    let id = h.trakt_with(None)?;
    let err = h.broker.get_valid_access_token(Provider::Trakt, &id).await.err();
    assert!(matches!(err, Some(CredentialError::ReauthRequired(_))));

    let err = h.broker.get_valid_access_token(Provider::Trakt, "missing").await.err();
    assert!(matches!(err, Some(CredentialError::UnknownAccount(_))));
    Ok(())
}

#[tokio::test]
async fn device_auth_stores_token_and_username() -> anyhow::Result<()> {
    let h = Harness::new(vec![
        MockRoute::new(
            "/oauth/device/code",
            vec![(
                200,
                json!({"device_code": "dev-1", "user_code": "CODE", "verification_url": "https://trakt.tv/activate", "expires_in": 600, "interval": 5}),
            )],
        ),
        MockRoute::new(
            "/oauth/device/token",
            vec![
                (400, json!({})),
                (200, json!({"access_token": "at", "refresh_token": "rt", "expires_in": 7_776_000, "created_at": NOW})),
            ],
        ),
        MockRoute::new("/users/me", vec![(200, json!({"username": "sean"}))]),
    ])
    .await?;
    let id = h.trakt_with(None)?;

    let challenge = h.broker.start_device_auth(&id).await?;
    assert_eq!(challenge.handle(), "dev-1");

    assert_eq!(
        h.broker.check_device_auth(&id, "dev-1").await?,
        AuthProgress::Pending { slow_down: false }
    );
    assert_eq!(h.credential(Provider::Trakt, &id)?, None);

    assert_eq!(
        h.broker.check_device_auth(&id, "dev-1").await?,
        AuthProgress::Authorized { username: "sean".to_owned() }
    );
    let stored = h.credential(Provider::Trakt, &id)?.ok_or_else(|| anyhow::anyhow!("not stored"))?;
    assert_eq!(stored.access_token, "at");
    assert_eq!(stored.refresh_token.as_deref(), Some("rt"));
    assert_eq!(stored.expires_at, NOW + 7_776_000);
    assert_eq!(stored.username, "sean");
    Ok(())
}

#[tokio::test]
async fn denied_device_auth_clears_unusable_credential() -> anyhow::Result<()> {
    let h = Harness::new(vec![MockRoute::new("/oauth/device/token", vec![(418, json!({}))])]).await?;
    let id = h.trakt_with(Some(record(NOW - 60, Some("rt"))))?;
    let err = h.broker.check_device_auth(&id, "dev-1").await.err();
    assert!(err.as_ref().is_some_and(CredentialError::is_terminal));
    assert_eq!(h.credential(Provider::Trakt, &id)?, None);
    Ok(())
}

#[tokio::test]
async fn repeated_check_after_success_keeps_credential() -> anyhow::Result<()> {
    let h = Harness::new(vec![
        MockRoute::new(
            "/oauth/device/token",
            vec![
                (200, json!({"access_token": "at", "refresh_token": "rt", "expires_in": 7_776_000, "created_at": NOW})),
                (409, json!({})),
            ],
        ),
        MockRoute::new("/users/me", vec![(200, json!({"username": "sean"}))]),
    ])
    .await?;
    let id = h.trakt_with(None)?;

    assert_eq!(
        h.broker.check_device_auth(&id, "dev-1").await?,
        AuthProgress::Authorized { username: "sean".to_owned() }
    );
    let err = h.broker.check_device_auth(&id, "dev-1").await.err();
    assert!(err.as_ref().is_some_and(CredentialError::is_terminal), "{err:?}");

    let stored = h.credential(Provider::Trakt, &id)?.ok_or_else(|| anyhow::anyhow!("cleared"))?;
    assert_eq!(stored.access_token, "at");
    Ok(())
}

#[tokio::test]
async fn stale_handle_leaves_valid_credential() -> anyhow::Result<()> {
    let h = Harness::new(vec![MockRoute::new("/oauth/device/token", vec![(404, json!({}))])]).await?;
    let id = h.trakt_with(Some(record(NOW + 2 * 3600, Some("rt"))))?;
    let err = h.broker.check_device_auth(&id, "typo").await.err();
    assert!(err.as_ref().is_some_and(CredentialError::is_terminal), "{err:?}");
    assert_eq!(h.credential(Provider::Trakt, &id)?, Some(record(NOW + 2 * 3600, Some("rt"))));
    Ok(())
}

fn pin_routes() -> Vec<MockRoute> {
    vec![
        MockRoute::new("/pins", vec![(201, json!({"id": 42, "code": "ab12", "expiresIn": 900}))]),
        MockRoute::new(
            "/pins/{id}",
            vec![(200, json!({"id": 42, "code": "ab12", "authToken": "plex-token", "expiresIn": 890}))],
        ),
        MockRoute::new("/user", vec![(200, json!({"username": "viewer"}))]),
    ]
}

#[tokio::test]
async fn pin_auth_stores_long_lived_token() -> anyhow::Result<()> {
    let h = Harness::new(pin_routes()).await?;
    let account = h.broker.create_account(Provider::Plex, "plex", "acct-1", "", "")?;
    assert_eq!(account.client_id, "test-client");

    let challenge = h.broker.start_pin_auth(&account.id).await?;
    match challenge {
        Challenge::Pin { ref auth_url, .. } => assert!(auth_url.contains("code=ab12")),
        ref other => anyhow::bail!("expected pin challenge, got {other:?}"),
    }
    assert_eq!(
        h.broker.check_pin_auth(&account.id, 42).await?,
        AuthProgress::Authorized { username: "viewer".to_owned() }
    );

    let stored =
        h.credential(Provider::Plex, &account.id)?.ok_or_else(|| anyhow::anyhow!("not stored"))?;
    assert_eq!(stored.expires_at, 0);
    assert_eq!(stored.refresh_token, None);

    // Long-lived: returned as is, until the provider rejects it.
    assert_eq!(h.broker.get_valid_access_token(Provider::Plex, &account.id).await?, "plex-token");
    h.broker.report_rejected(Provider::Plex, &account.id)?;
    let err = h.broker.get_valid_access_token(Provider::Plex, &account.id).await.err();
    assert!(matches!(err, Some(CredentialError::ReauthRequired(_))));
    Ok(())
}

#[tokio::test]
async fn wait_for_auth_drives_pin_to_completion() -> anyhow::Result<()> {
    let h = Harness::new(pin_routes()).await?;
    let account = h.broker.create_account(Provider::Plex, "plex", "acct-1", "", "")?;
    let challenge = h.broker.start_auth(Provider::Plex, &account.id).await?;

    let username = h
        .broker
        .wait_for_auth(Provider::Plex, &account.id, &challenge, &CancellationToken::new())
        .await?;
    assert_eq!(username, "viewer");
    assert_eq!(h.mock.calls("/pins/{id}"), 1);
    Ok(())
}

/// A settings collaborator whose writes always fail.
struct ReadOnlyStore(FileCredentialStore);

impl CredentialStore for ReadOnlyStore {
    fn list(&self) -> anyhow::Result<Vec<LinkedAccount>> {
        self.0.list()
    }

    fn upsert(&self, account: LinkedAccount) -> anyhow::Result<()> {
        self.0.upsert(account)
    }

    fn write_credential(&self, _: Provider, _: &str, _: CredentialRecord) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }

    fn clear_credential(&self, _: Provider, _: &str) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }
}

#[tokio::test]
async fn store_failure_after_auth_is_surfaced() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mock = MockProvider::start(pin_routes()).await?;
    let config = test_config(dir.path(), &mock.url());
    let store = Arc::new(ReadOnlyStore(FileCredentialStore::new(config.settings_path())));
    let broker = CredentialBroker::new(&config, store, Arc::new(ManualClock::new(NOW * 1000)))?;
    let account = broker.create_account(Provider::Plex, "plex", "acct-1", "", "")?;

    let err = broker.check_pin_auth(&account.id, 42).await.err();
    assert!(matches!(err, Some(CredentialError::Persistence(_))), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn listing_is_scoped_to_owner() -> anyhow::Result<()> {
    let h = Harness::new(vec![]).await?;
    h.broker.create_account(Provider::Trakt, "mine", "acct-1", "cid", "secret")?;
    h.broker.create_account(Provider::Plex, "theirs", "acct-2", "", "")?;
    h.broker.create_account(Provider::Plex, "shared", "", "", "")?;

    let session = |account: &str, master: bool| Session {
        token: String::new(),
        expiry_ms: u64::MAX,
        is_master: master,
        account_id: account.to_owned(),
    };

    let mine = h.broker.list_for(&session("acct-1", false))?;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].name, "mine");
    assert_eq!(mine[0].status, crate::credential::AccountStatus::Disconnected);

    assert_eq!(h.broker.list_for(&session("acct-admin", true))?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn blank_account_name_is_rejected() -> anyhow::Result<()> {
    let h = Harness::new(vec![]).await?;
    let err = h.broker.create_account(Provider::Trakt, "  ", "acct-1", "cid", "secret").err();
    assert!(matches!(err, Some(CredentialError::Invalid(_))));
    Ok(())
}
