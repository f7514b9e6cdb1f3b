// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PIN authorization client: create a PIN, send the user to a browser URL,
//! poll the PIN until it carries a token. Tokens are long-lived; no refresh.

use crate::credential::flow::{AuthFlow, Challenge, Grant, PollOutcome};
use crate::credential::oauth::{urlencoded, PinResponse, UserInfo};
use crate::credential::{CredentialError, Provider};

const PLATFORM: &str = "Web";

pub struct PinClient {
    http: reqwest::Client,
    base_url: String,
    auth_url: String,
    client_id: String,
    product: String,
}

impl PinClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        auth_url: impl Into<String>,
        client_id: impl Into<String>,
        product: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            auth_url: auth_url.into(),
            client_id: client_id.into(),
            product: product.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn with_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("Accept", "application/json")
            .header("X-Plex-Client-Identifier", &self.client_id)
            .header("X-Plex-Product", &self.product)
            .header("X-Plex-Version", env!("CARGO_PKG_VERSION"))
            .header("X-Plex-Platform", PLATFORM)
    }

    /// Create a strong PIN.
    pub async fn create_pin(&self) -> Result<PinResponse, CredentialError> {
        let resp = self
            .with_headers(self.http.post(format!("{}/pins?strong=true", self.base_url)))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CredentialError::Transient(format!("pin creation failed ({status}): {text}")));
        }
        Ok(resp.json().await?)
    }

    /// Browser URL where the user approves `code`. Pure; no network.
    pub fn get_auth_url(&self, code: &str) -> String {
        let query = urlencoded(&[
            ("clientID", self.client_id.as_str()),
            ("code", code),
            ("context[device][product]", self.product.as_str()),
        ]);
        format!("{}#?{}", self.auth_url, query)
    }

    /// Poll the PIN once. A missing token means still pending.
    ///
    /// A PIN the provider no longer knows, or one whose lifetime has run
    /// out without a token, is terminal.
    pub async fn check_pin(&self, id: u64) -> Result<PinResponse, CredentialError> {
        let resp = self
            .with_headers(self.http.get(format!("{}/pins/{}", self.base_url, id)))
            .send()
            .await?;

        let status = resp.status();
        match status.as_u16() {
            200 => {}
            404 | 410 => {
                return Err(CredentialError::ReauthRequired("pin expired or unknown".to_owned()));
            }
            _ => {
                let text = resp.text().await.unwrap_or_default();
                return Err(CredentialError::Transient(format!("pin check failed ({status}): {text}")));
            }
        }

        let pin: PinResponse = resp.json().await?;
        if pin.token().is_none() && pin.expires_in == Some(0) {
            return Err(CredentialError::ReauthRequired("pin expired".to_owned()));
        }
        Ok(pin)
    }

    /// Fetch the account owning `token`.
    pub async fn user_info(&self, token: &str) -> Result<UserInfo, CredentialError> {
        let resp = self
            .with_headers(self.http.get(format!("{}/user", self.base_url)))
            .header("X-Plex-Token", token)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 401 {
            return Err(CredentialError::ReauthRequired("token rejected".to_owned()));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CredentialError::Transient(format!("user request failed ({status}): {text}")));
        }
        Ok(resp.json().await?)
    }
}

impl AuthFlow for PinClient {
    fn provider(&self) -> Provider {
        Provider::Plex
    }

    async fn start(&self) -> Result<Challenge, CredentialError> {
        let pin = self.create_pin().await?;
        let auth_url = self.get_auth_url(&pin.code);
        Ok(Challenge::Pin {
            id: pin.id,
            code: pin.code,
            auth_url,
            expires_in: pin.expires_in.unwrap_or(0),
        })
    }

    async fn poll(&self, handle: &str) -> Result<PollOutcome, CredentialError> {
        let id: u64 = handle
            .parse()
            .map_err(|_| CredentialError::Invalid(format!("pin id must be numeric: {handle}")))?;
        let pin = self.check_pin(id).await?;
        Ok(match pin.token() {
            Some(token) => PollOutcome::Authorized(Grant {
                access_token: token.to_owned(),
                refresh_token: None,
                expires_at: 0,
            }),
            None => PollOutcome::Pending,
        })
    }

    async fn username(&self, access_token: &str) -> Result<String, CredentialError> {
        let info = self.user_info(access_token).await?;
        Ok(if info.username.is_empty() { info.title } else { info.username })
    }
}

#[cfg(test)]
#[path = "pin_tests.rs"]
mod tests;
