// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential broker: runs authorization flows for linked accounts, hands
//! out fresh access tokens, and writes every change through the store.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::GatekeeperConfig;
use crate::credential::device_code::DeviceCodeClient;
use crate::credential::flow::{self, AuthFlow, Challenge, Grant, PollOutcome};
use crate::credential::pin::PinClient;
use crate::credential::store::CredentialStore;
use crate::credential::{
    AccountStatusInfo, CredentialError, CredentialRecord, LinkedAccount, Provider,
};
use crate::session::Session;

/// Result of a single authorization check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuthProgress {
    #[serde(rename_all = "camelCase")]
    Pending { slow_down: bool },
    Authorized { username: String },
}

/// Serializes refreshes per account so a rotated refresh token is never
/// spent twice by racing callers.
type RefreshLocks = parking_lot::Mutex<HashMap<(Provider, String), Arc<tokio::sync::Mutex<()>>>>;

pub struct CredentialBroker {
    store: Arc<dyn CredentialStore>,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    trakt_base_url: String,
    plex_base_url: String,
    plex_auth_url: String,
    plex_client_id: String,
    plex_product: String,
    refresh_threshold_secs: u64,
    refresh_locks: RefreshLocks,
}

impl CredentialBroker {
    pub fn new(
        config: &GatekeeperConfig,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        crate::ensure_crypto();
        let http = reqwest::Client::builder().timeout(config.provider_timeout()).build()?;
        Ok(Self {
            store,
            http,
            clock,
            trakt_base_url: config.trakt_base_url.clone(),
            plex_base_url: config.plex_base_url.clone(),
            plex_auth_url: config.plex_auth_url.clone(),
            plex_client_id: config.plex_client_id(),
            plex_product: config.plex_product.clone(),
            refresh_threshold_secs: config.refresh_threshold_secs,
            refresh_locks: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    fn device_client(&self, account: &LinkedAccount) -> DeviceCodeClient {
        DeviceCodeClient::new(
            self.http.clone(),
            &self.trakt_base_url,
            &account.client_id,
            &account.client_secret,
            Arc::clone(&self.clock),
        )
    }

    fn pin_client(&self, account: &LinkedAccount) -> PinClient {
        let client_id =
            if account.client_id.is_empty() { &self.plex_client_id } else { &account.client_id };
        PinClient::new(
            self.http.clone(),
            &self.plex_base_url,
            &self.plex_auth_url,
            client_id,
            &self.plex_product,
        )
    }

    /// Look up a linked account.
    pub fn account(&self, provider: Provider, id: &str) -> Result<LinkedAccount, CredentialError> {
        self.store
            .get(provider, id)
            .map_err(CredentialError::persistence)?
            .ok_or_else(|| CredentialError::UnknownAccount(id.to_owned()))
    }

    /// Status of every linked account the session may see.
    ///
    /// Accounts without an owner are visible to master sessions only.
    pub fn list_for(&self, session: &Session) -> Result<Vec<AccountStatusInfo>, CredentialError> {
        let now = self.clock.now_secs();
        let accounts = self.store.list().map_err(CredentialError::persistence)?;
        Ok(accounts
            .iter()
            .filter(|a| session.is_master || a.owner_account_id == session.account_id)
            .map(|a| AccountStatusInfo::from_account(a, now))
            .collect())
    }

    /// Register a new linked account with no credential.
    pub fn create_account(
        &self,
        provider: Provider,
        name: &str,
        owner_account_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<LinkedAccount, CredentialError> {
        if name.trim().is_empty() {
            return Err(CredentialError::Invalid("account name is required".to_owned()));
        }
        let client_id = match provider {
            Provider::Plex if client_id.is_empty() => self.plex_client_id.clone(),
            _ => client_id.to_owned(),
        };
        let account = LinkedAccount {
            id: uuid::Uuid::new_v4().to_string(),
            provider,
            name: name.trim().to_owned(),
            owner_account_id: owner_account_id.to_owned(),
            client_id,
            client_secret: client_secret.to_owned(),
            credential: None,
        };
        self.store.upsert(account.clone()).map_err(CredentialError::persistence)?;
        tracing::info!(provider = %provider, account = %account.id, owner = %owner_account_id, "linked account created");
        Ok(account)
    }

    /// Begin authorization for a linked account.
    pub async fn start_auth(
        &self,
        provider: Provider,
        id: &str,
    ) -> Result<Challenge, CredentialError> {
        let account = self.account(provider, id)?;
        let challenge = match provider {
            Provider::Trakt => self.device_client(&account).start().await?,
            Provider::Plex => self.pin_client(&account).start().await?,
        };
        tracing::info!(provider = %provider, account = %id, "authorization started");
        Ok(challenge)
    }

    /// Poll the provider once; on success fetch the username and persist.
    pub async fn check_auth(
        &self,
        provider: Provider,
        id: &str,
        handle: &str,
    ) -> Result<AuthProgress, CredentialError> {
        let account = self.account(provider, id)?;
        match provider {
            Provider::Trakt => self.check_with(&self.device_client(&account), &account, handle).await,
            Provider::Plex => self.check_with(&self.pin_client(&account), &account, handle).await,
        }
    }

    pub async fn start_device_auth(&self, id: &str) -> Result<Challenge, CredentialError> {
        self.start_auth(Provider::Trakt, id).await
    }

    pub async fn check_device_auth(
        &self,
        id: &str,
        device_code: &str,
    ) -> Result<AuthProgress, CredentialError> {
        self.check_auth(Provider::Trakt, id, device_code).await
    }

    pub async fn start_pin_auth(&self, id: &str) -> Result<Challenge, CredentialError> {
        self.start_auth(Provider::Plex, id).await
    }

    pub async fn check_pin_auth(&self, id: &str, pin_id: u64) -> Result<AuthProgress, CredentialError> {
        self.check_auth(Provider::Plex, id, &pin_id.to_string()).await
    }

    /// Drive a started challenge to completion, for callers without their own
    /// poll loop. Returns the username once the credential is stored.
    pub async fn wait_for_auth(
        &self,
        provider: Provider,
        id: &str,
        challenge: &Challenge,
        cancel: &CancellationToken,
    ) -> Result<String, CredentialError> {
        let account = self.account(provider, id)?;
        let interval = std::time::Duration::from_secs(challenge.interval());
        let window = std::time::Duration::from_secs(challenge.expires_in());
        let handle = challenge.handle();
        match provider {
            Provider::Trakt => {
                let client = self.device_client(&account);
                let grant =
                    flow::wait_for_authorization(&client, &handle, interval, window, cancel).await?;
                self.complete(&client, &account, grant).await
            }
            Provider::Plex => {
                let client = self.pin_client(&account);
                let grant =
                    flow::wait_for_authorization(&client, &handle, interval, window, cancel).await?;
                self.complete(&client, &account, grant).await
            }
        }
    }

    async fn check_with<F: AuthFlow>(
        &self,
        client: &F,
        account: &LinkedAccount,
        handle: &str,
    ) -> Result<AuthProgress, CredentialError> {
        match client.poll(handle).await {
            Ok(PollOutcome::Pending) => {
                tracing::debug!(provider = %account.provider, account = %account.id, "authorization pending");
                Ok(AuthProgress::Pending { slow_down: false })
            }
            Ok(PollOutcome::SlowDown) => {
                tracing::debug!(provider = %account.provider, account = %account.id, "authorization pending, slow down");
                Ok(AuthProgress::Pending { slow_down: true })
            }
            Ok(PollOutcome::Authorized(grant)) => {
                let username = self.complete(client, account, grant).await?;
                Ok(AuthProgress::Authorized { username })
            }
            Err(e) => {
                // A dead challenge only drops what is already unusable.
                if e.is_terminal() && !self.holds_usable(account.provider, &account.id) {
                    self.clear_quietly(account.provider, &account.id);
                }
                Err(e)
            }
        }
    }

    /// Fetch the username and persist token + username in one write.
    async fn complete<F: AuthFlow>(
        &self,
        client: &F,
        account: &LinkedAccount,
        grant: Grant,
    ) -> Result<String, CredentialError> {
        let username = match client.username(&grant.access_token).await {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(provider = %account.provider, account = %account.id, err = %e, "failed to fetch username");
                String::new()
            }
        };
        let record = CredentialRecord {
            access_token: grant.access_token,
            refresh_token: if client.refreshes() { grant.refresh_token } else { None },
            expires_at: grant.expires_at,
            username: username.clone(),
        };
        if let Err(e) = self.store.write_credential(account.provider, &account.id, record) {
            tracing::error!(provider = %account.provider, account = %account.id, err = %e, "authorized but failed to store credential");
            return Err(CredentialError::persistence(e));
        }
        tracing::info!(provider = %account.provider, account = %account.id, username = %username, "provider authorized");
        Ok(username)
    }

    fn needs_refresh(&self, record: &CredentialRecord) -> bool {
        record.expires_at != 0
            && record.expires_at.saturating_sub(self.clock.now_secs()) < self.refresh_threshold_secs
    }

    fn connected(&self, provider: Provider, id: &str) -> Result<CredentialRecord, CredentialError> {
        self.account(provider, id)?
            .credential
            .filter(|c| !c.access_token.is_empty())
            .ok_or_else(|| CredentialError::ReauthRequired(format!("{provider} account is not connected")))
    }

    fn refresh_lock(&self, provider: Provider, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.refresh_locks.lock();
        Arc::clone(locks.entry((provider, id.to_owned())).or_default())
    }

    /// Return an access token that is safe to use right now.
    ///
    /// Refreshes first when fewer than the threshold seconds remain and a
    /// refresh token exists. Never returns a token known to be expired.
    pub async fn get_valid_access_token(
        &self,
        provider: Provider,
        id: &str,
    ) -> Result<String, CredentialError> {
        let record = self.connected(provider, id)?;
        if !self.needs_refresh(&record) {
            return Ok(record.access_token);
        }

        let lock = self.refresh_lock(provider, id);
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited.
        let record = self.connected(provider, id)?;
        if !self.needs_refresh(&record) {
            return Ok(record.access_token);
        }

        let expired = record.expires_at <= self.clock.now_secs();
        let refresh_token = match record.refresh_token() {
            Some(rt) if provider.supports_refresh() => rt.to_owned(),
            _ if expired => {
                tracing::warn!(provider = %provider, account = %id, "access token expired and cannot be refreshed");
                return Err(CredentialError::ReauthRequired(format!(
                    "{provider} access token expired"
                )));
            }
            _ => return Ok(record.access_token),
        };

        let account = self.account(provider, id)?;
        let client = self.device_client(&account);
        match client.refresh_access_token(&refresh_token).await {
            Ok(token) => {
                let grant = client.grant_from(token);
                let access_token = grant.access_token.clone();
                let rotated = CredentialRecord {
                    access_token: grant.access_token,
                    refresh_token: grant.refresh_token.or(Some(refresh_token)),
                    expires_at: grant.expires_at,
                    username: record.username,
                };
                if let Err(e) = self.store.write_credential(provider, id, rotated) {
                    tracing::error!(provider = %provider, account = %id, err = %e, "refreshed token could not be stored");
                } else {
                    tracing::info!(provider = %provider, account = %id, "access token refreshed");
                }
                Ok(access_token)
            }
            Err(e) if e.is_terminal() => {
                tracing::warn!(provider = %provider, account = %id, err = %e, "refresh rejected, clearing credential");
                self.clear_quietly(provider, id);
                Err(e)
            }
            Err(e) => {
                tracing::warn!(provider = %provider, account = %id, err = %e, "refresh failed");
                Err(e)
            }
        }
    }

    /// An outbound call was rejected with this account's token. Clears the
    /// stored credential so the next use asks for re-authentication.
    pub fn report_rejected(&self, provider: Provider, id: &str) -> Result<(), CredentialError> {
        self.account(provider, id)?;
        self.store.clear_credential(provider, id).map_err(CredentialError::persistence)?;
        tracing::warn!(provider = %provider, account = %id, "provider rejected token, credential cleared");
        Ok(())
    }

    pub fn disconnect(&self, provider: Provider, id: &str) -> Result<(), CredentialError> {
        self.account(provider, id)?;
        self.store.clear_credential(provider, id).map_err(CredentialError::persistence)?;
        tracing::info!(provider = %provider, account = %id, "linked account disconnected");
        Ok(())
    }

    fn holds_usable(&self, provider: Provider, id: &str) -> bool {
        let now = self.clock.now_secs();
        self.account(provider, id).ok().and_then(|a| a.credential).is_some_and(|c| {
            !c.access_token.is_empty() && (c.expires_at == 0 || c.expires_at > now)
        })
    }

    fn clear_quietly(&self, provider: Provider, id: &str) {
        if let Err(e) = self.store.clear_credential(provider, id) {
            tracing::warn!(provider = %provider, account = %id, err = %e, "failed to clear credential");
        }
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
