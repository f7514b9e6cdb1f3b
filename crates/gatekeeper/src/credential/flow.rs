// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider-agnostic authorization flow: start a challenge, poll it, and
//! optionally drive the poll loop until a terminal outcome.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::credential::{CredentialError, Provider};

/// Extra delay added to the poll interval each time the provider says slow down.
pub const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// Window used when the provider does not say how long a challenge lives.
pub const DEFAULT_AUTH_WINDOW: Duration = Duration::from_secs(900);

/// What the user must do to authorize, returned by [`AuthFlow::start`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Challenge {
    #[serde(rename_all = "camelCase")]
    Device {
        device_code: String,
        user_code: String,
        verification_url: String,
        expires_in: u64,
        interval: u64,
    },
    #[serde(rename_all = "camelCase")]
    Pin { id: u64, code: String, auth_url: String, expires_in: u64 },
}

impl Challenge {
    /// Opaque handle the caller passes back to [`AuthFlow::poll`].
    pub fn handle(&self) -> String {
        match self {
            Self::Device { device_code, .. } => device_code.clone(),
            Self::Pin { id, .. } => id.to_string(),
        }
    }

    pub fn expires_in(&self) -> u64 {
        match self {
            Self::Device { expires_in, .. } | Self::Pin { expires_in, .. } => *expires_in,
        }
    }

    /// Suggested seconds between polls.
    pub fn interval(&self) -> u64 {
        match self {
            Self::Device { interval, .. } => (*interval).max(1),
            Self::Pin { .. } => 1,
        }
    }
}

/// Tokens obtained from a completed authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Epoch seconds, 0 when the provider gave no lifetime.
    pub expires_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Pending,
    SlowDown,
    Authorized(Grant),
}

/// One provider's authorization protocol.
///
/// A single `poll` performs exactly one request. Terminal failures surface as
/// [`CredentialError::ReauthRequired`], retryable ones as `Transient`.
pub trait AuthFlow: Send + Sync {
    fn provider(&self) -> Provider;

    /// Whether grants from this flow carry a usable refresh token.
    fn refreshes(&self) -> bool {
        self.provider().supports_refresh()
    }

    fn start(&self) -> impl Future<Output = Result<Challenge, CredentialError>> + Send;

    fn poll(&self, handle: &str) -> impl Future<Output = Result<PollOutcome, CredentialError>> + Send;

    /// Resolve the display username for a fresh access token.
    fn username(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<String, CredentialError>> + Send;
}

/// Poll `handle` until authorized, a terminal failure, the deadline, or cancel.
///
/// Transient failures are logged and polling continues on schedule. A
/// slow-down response permanently widens the interval by [`SLOW_DOWN_STEP`].
/// Cancellation returns promptly without issuing another request. A zero
/// `expires_in` means the provider gave no lifetime; [`DEFAULT_AUTH_WINDOW`]
/// applies instead.
pub async fn wait_for_authorization<F: AuthFlow>(
    flow: &F,
    handle: &str,
    interval: Duration,
    expires_in: Duration,
    cancel: &CancellationToken,
) -> Result<Grant, CredentialError> {
    let window = if expires_in.is_zero() { DEFAULT_AUTH_WINDOW } else { expires_in };
    let deadline = tokio::time::Instant::now() + window;
    let mut interval = interval.max(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(CredentialError::Cancelled),
            _ = tokio::time::sleep(interval) => {}
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(CredentialError::ReauthRequired("authorization window expired".to_owned()));
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(CredentialError::Cancelled),
            r = flow.poll(handle) => r,
        };

        match result {
            Ok(PollOutcome::Authorized(grant)) => return Ok(grant),
            Ok(PollOutcome::Pending) => {}
            Ok(PollOutcome::SlowDown) => {
                interval += SLOW_DOWN_STEP;
                tracing::debug!(provider = %flow.provider(), interval_secs = interval.as_secs(), "provider asked to slow down");
            }
            Err(e) if e.is_terminal() => return Err(e),
            Err(CredentialError::Transient(msg)) => {
                tracing::warn!(provider = %flow.provider(), "authorization poll failed, retrying: {msg}");
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[path = "flow_tests.rs"]
mod tests;
