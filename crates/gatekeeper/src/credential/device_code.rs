// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device-code authorization client (user enters a short code on another device).
//!
//! Each call is a single request; polling cadence belongs to the caller.

use std::sync::Arc;

use crate::clock::Clock;
use crate::credential::flow::{AuthFlow, Challenge, Grant, PollOutcome};
use crate::credential::oauth::{DeviceCodeResponse, TokenResponse, UserProfile};
use crate::credential::{CredentialError, Provider};

const API_VERSION: &str = "2";

/// How a token-poll status code is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Ready,
    /// The user has not finished authorizing yet.
    Pending,
    /// Pending, and the caller is polling faster than the provider allows.
    SlowDown,
    Terminal(&'static str),
    Transient,
}

pub fn classify_poll(status: u16) -> PollStatus {
    match status {
        200 | 201 => PollStatus::Ready,
        400 => PollStatus::Pending,
        429 => PollStatus::SlowDown,
        401 | 403 => PollStatus::Terminal("client credentials rejected"),
        404 => PollStatus::Terminal("invalid device code"),
        409 => PollStatus::Terminal("device code already used"),
        410 => PollStatus::Terminal("device code expired"),
        418 => PollStatus::Terminal("authorization denied"),
        _ => PollStatus::Transient,
    }
}

/// Whether a failed refresh means the refresh token is no longer usable.
pub fn refresh_is_terminal(status: u16) -> bool {
    matches!(status, 400 | 401 | 403)
}

/// Client for one provider application (client id + secret).
pub struct DeviceCodeClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    clock: Arc<dyn Clock>,
}

impl DeviceCodeClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            clock,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(self.url(path))
            .header("trakt-api-version", API_VERSION)
            .header("trakt-api-key", &self.client_id)
    }

    fn ensure_configured(&self) -> Result<(), CredentialError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(CredentialError::NotConfigured(
                "client id and secret are required".to_owned(),
            ));
        }
        Ok(())
    }

    /// Request a new device code and user code.
    pub async fn get_device_code(&self) -> Result<DeviceCodeResponse, CredentialError> {
        self.ensure_configured()?;
        let resp = self
            .post("/oauth/device/code")
            .json(&serde_json::json!({ "client_id": self.client_id }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(if status.is_server_error() {
                CredentialError::Transient(format!("device code request failed ({status}): {text}"))
            } else {
                CredentialError::NotConfigured(format!(
                    "device code request rejected ({status}): {text}"
                ))
            });
        }

        Ok(resp.json().await?)
    }

    /// Poll once for the token. `Ok(None)` while the user has not finished.
    pub async fn poll_for_token(
        &self,
        device_code: &str,
    ) -> Result<Option<TokenResponse>, CredentialError> {
        Ok(self.poll_once(device_code).await?.1)
    }

    /// Poll once, keeping the distinction between pending and slow-down.
    pub(crate) async fn poll_once(
        &self,
        device_code: &str,
    ) -> Result<(PollStatus, Option<TokenResponse>), CredentialError> {
        self.ensure_configured()?;
        let resp = self
            .post("/oauth/device/token")
            .json(&serde_json::json!({
                "code": device_code,
                "client_id": self.client_id,
                "client_secret": self.client_secret,
            }))
            .send()
            .await?;

        let status = resp.status();
        match classify_poll(status.as_u16()) {
            PollStatus::Ready => Ok((PollStatus::Ready, Some(resp.json().await?))),
            PollStatus::Transient => {
                let text = resp.text().await.unwrap_or_default();
                Err(CredentialError::Transient(format!("token poll failed ({status}): {text}")))
            }
            PollStatus::Terminal(reason) => Err(CredentialError::ReauthRequired(reason.to_owned())),
            other => Ok((other, None)),
        }
    }

    /// Exchange a refresh token for a new access/refresh pair.
    ///
    /// The old refresh token is consumed by the provider; the caller must
    /// persist the rotated one.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, CredentialError> {
        self.ensure_configured()?;
        let resp = self
            .post("/oauth/token")
            .json(&serde_json::json!({
                "refresh_token": refresh_token,
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "redirect_uri": "urn:ietf:wg:oauth:2.0:oob",
                "grant_type": "refresh_token",
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(if refresh_is_terminal(status.as_u16()) {
                CredentialError::ReauthRequired(format!("refresh rejected ({status}): {text}"))
            } else {
                CredentialError::Transient(format!("refresh failed ({status}): {text}"))
            });
        }

        Ok(resp.json().await?)
    }

    /// Fetch the profile of the user owning `access_token`.
    pub async fn user_profile(&self, access_token: &str) -> Result<UserProfile, CredentialError> {
        let resp = self
            .http
            .get(self.url("/users/me"))
            .header("trakt-api-version", API_VERSION)
            .header("trakt-api-key", &self.client_id)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 401 {
            return Err(CredentialError::ReauthRequired("access token rejected".to_owned()));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CredentialError::Transient(format!("profile request failed ({status}): {text}")));
        }
        Ok(resp.json().await?)
    }

    /// Convert a token response into a stored grant using this client's clock.
    pub fn grant_from(&self, token: TokenResponse) -> Grant {
        let expires_at = token.expires_at(self.clock.now_secs());
        Grant {
            access_token: token.access_token,
            refresh_token: token.refresh_token.filter(|t| !t.is_empty()),
            expires_at,
        }
    }
}

impl AuthFlow for DeviceCodeClient {
    fn provider(&self) -> Provider {
        Provider::Trakt
    }

    async fn start(&self) -> Result<Challenge, CredentialError> {
        let code = self.get_device_code().await?;
        Ok(Challenge::Device {
            device_code: code.device_code,
            user_code: code.user_code,
            verification_url: code.verification_url,
            expires_in: code.expires_in,
            interval: code.interval,
        })
    }

    async fn poll(&self, handle: &str) -> Result<PollOutcome, CredentialError> {
        match self.poll_once(handle).await? {
            (_, Some(token)) => Ok(PollOutcome::Authorized(self.grant_from(token))),
            (PollStatus::SlowDown, None) => Ok(PollOutcome::SlowDown),
            (_, None) => Ok(PollOutcome::Pending),
        }
    }

    async fn username(&self, access_token: &str) -> Result<String, CredentialError> {
        Ok(self.user_profile(access_token).await?.username)
    }
}

#[cfg(test)]
#[path = "device_code_tests.rs"]
mod tests;
