// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Third-party provider credentials: device-code and PIN authorization
//! flows, refresh-before-use, and the persistence adapter they write through.

pub mod broker;
pub mod device_code;
pub mod flow;
pub mod oauth;
pub mod pin;
pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Supported credential providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Device-code authorization with rotating refresh tokens.
    Trakt,
    /// PIN authorization; tokens are long-lived and never refreshed.
    Plex,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trakt => "trakt",
            Self::Plex => "plex",
        }
    }

    pub fn supports_refresh(&self) -> bool {
        matches!(self, Self::Trakt)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored tokens for one linked provider account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry as epoch seconds. 0 means unknown / non-expiring.
    #[serde(default)]
    pub expires_at: u64,
    #[serde(default)]
    pub username: String,
}

impl CredentialRecord {
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// A provider account registered in settings, owned by a login account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAccount {
    pub id: String,
    pub provider: Provider,
    pub name: String,
    /// Owning login account. Empty means shared, visible to master only.
    #[serde(default)]
    pub owner_account_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<CredentialRecord>,
}

/// Connection status of a linked account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Connected,
    /// Access token expired; usable again only after a refresh.
    Expired,
    Disconnected,
}

/// Secret-free view of a linked account (returned by the API).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatusInfo {
    pub id: String,
    pub provider: Provider,
    pub name: String,
    pub owner_account_id: String,
    pub status: AccountStatus,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<u64>,
    pub has_refresh_token: bool,
}

impl AccountStatusInfo {
    pub fn from_account(account: &LinkedAccount, now_secs: u64) -> Self {
        let (status, username, expires_in_secs, has_refresh_token) = match account.credential {
            Some(ref c) if !c.access_token.is_empty() => {
                let expired = c.expires_at != 0 && c.expires_at <= now_secs;
                let status = if expired { AccountStatus::Expired } else { AccountStatus::Connected };
                let expires_in = if c.expires_at > now_secs { Some(c.expires_at - now_secs) } else { None };
                (status, c.username.clone(), expires_in, c.refresh_token().is_some())
            }
            _ => (AccountStatus::Disconnected, String::new(), None, false),
        };
        Self {
            id: account.id.clone(),
            provider: account.provider,
            name: account.name.clone(),
            owner_account_id: account.owner_account_id.clone(),
            status,
            username,
            expires_in_secs,
            has_refresh_token,
        }
    }
}

/// Failures from credential flows, refresh, and persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Client credentials for the provider are missing.
    NotConfigured(String),
    UnknownAccount(String),
    /// Malformed caller input (e.g. a non-numeric PIN id).
    Invalid(String),
    /// Terminal: denied, expired code, consumed refresh token, no token.
    ReauthRequired(String),
    /// Network, timeout or 5xx from the provider. Retry later.
    Transient(String),
    /// Settings collaborator failed to store or read credentials.
    Persistence(String),
    /// The caller cancelled an in-flight poll.
    Cancelled,
}

impl CredentialError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ReauthRequired(_))
    }

    pub fn api_error(&self) -> ApiError {
        match self {
            Self::NotConfigured(_) | Self::Invalid(_) => ApiError::BadRequest,
            Self::UnknownAccount(_) => ApiError::NotFound,
            Self::ReauthRequired(_) => ApiError::ReauthRequired,
            Self::Transient(_) | Self::Cancelled => ApiError::ProviderUnavailable,
            Self::Persistence(_) => ApiError::Internal,
        }
    }

    pub(crate) fn persistence(err: anyhow::Error) -> Self {
        Self::Persistence(format!("{err:#}"))
    }
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured(m) => write!(f, "not configured: {m}"),
            Self::UnknownAccount(id) => write!(f, "unknown account: {id}"),
            Self::Invalid(m) => write!(f, "invalid request: {m}"),
            Self::ReauthRequired(m) => write!(f, "re-authentication required: {m}"),
            Self::Transient(m) => write!(f, "provider unavailable: {m}"),
            Self::Persistence(m) => write!(f, "credential storage failed: {m}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl std::error::Error for CredentialError {}

impl From<reqwest::Error> for CredentialError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transient(format!("request timed out: {e}"))
        } else {
            Self::Transient(e.to_string())
        }
    }
}
