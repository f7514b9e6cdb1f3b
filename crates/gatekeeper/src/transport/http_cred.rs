// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for linked provider accounts.
//!
//! Every account route checks ownership: master sessions may act on any
//! linked account, others only on accounts they own.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::credential::{AccountStatusInfo, CredentialError, LinkedAccount, Provider};
use crate::error::ApiError;
use crate::session::Session;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub name: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Master only: link on behalf of another login account.
    #[serde(default)]
    pub owner_account_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
}

fn credential_error(e: CredentialError) -> Response {
    let api = e.api_error();
    if api == ApiError::Internal {
        tracing::error!(err = %e, "credential request failed");
    }
    api.into_response_with(e.to_string())
}

/// Load a linked account and check the session may act on it.
fn owned_account(
    s: &AppState,
    session: &Session,
    provider: Provider,
    id: &str,
) -> Result<LinkedAccount, Response> {
    let account = s.credentials.account(provider, id).map_err(credential_error)?;
    if !session.can_access(&account.owner_account_id) {
        tracing::debug!(account = %session.account_id, linked = %id, "linked account access denied");
        return Err(ApiError::Forbidden.into_response_with("not your account"));
    }
    Ok(account)
}

/// `GET /api/credentials`
pub async fn list_accounts(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Response {
    match s.credentials.list_for(&session) {
        Ok(list) => Json(list).into_response(),
        Err(e) => credential_error(e),
    }
}

/// `POST /api/{provider}/accounts`
pub async fn create_account(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(provider): Path<Provider>,
    Json(req): Json<CreateAccountRequest>,
) -> Response {
    let owner = match req.owner_account_id {
        Some(owner) if owner != session.account_id && !session.is_master => {
            return ApiError::Forbidden.into_response_with("cannot link an account for another user");
        }
        Some(owner) => owner,
        None => session.account_id.clone(),
    };
    match s.credentials.create_account(provider, &req.name, &owner, &req.client_id, &req.client_secret)
    {
        Ok(account) => {
            let info = AccountStatusInfo::from_account(&account, s.clock.now_secs());
            (StatusCode::CREATED, Json(info)).into_response()
        }
        Err(e) => credential_error(e),
    }
}

/// `POST /api/{provider}/accounts/{id}/auth/start`: issue a device code or PIN.
pub async fn start_auth(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path((provider, id)): Path<(Provider, String)>,
) -> Response {
    if let Err(resp) = owned_account(&s, &session, provider, &id) {
        return resp;
    }
    match s.credentials.start_auth(provider, &id).await {
        Ok(challenge) => Json(challenge).into_response(),
        Err(e) => credential_error(e),
    }
}

/// `GET /api/{provider}/accounts/{id}/auth/check/{handle}`: poll once.
pub async fn check_auth(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path((provider, id, handle)): Path<(Provider, String, String)>,
) -> Response {
    if let Err(resp) = owned_account(&s, &session, provider, &id) {
        return resp;
    }
    match s.credentials.check_auth(provider, &id, &handle).await {
        Ok(progress) => Json(progress).into_response(),
        Err(e) => credential_error(e),
    }
}

/// `GET /api/{provider}/accounts/{id}/token`: a token safe to use right now.
pub async fn access_token(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path((provider, id)): Path<(Provider, String)>,
) -> Response {
    if let Err(resp) = owned_account(&s, &session, provider, &id) {
        return resp;
    }
    match s.credentials.get_valid_access_token(provider, &id).await {
        Ok(access_token) => Json(TokenResponse { access_token }).into_response(),
        Err(e) => credential_error(e),
    }
}

/// `POST /api/{provider}/accounts/{id}/rejected`: the provider refused the
/// token on an outbound call.
pub async fn report_rejected(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path((provider, id)): Path<(Provider, String)>,
) -> Response {
    if let Err(resp) = owned_account(&s, &session, provider, &id) {
        return resp;
    }
    match s.credentials.report_rejected(provider, &id) {
        Ok(()) => Json(serde_json::json!({ "cleared": true })).into_response(),
        Err(e) => credential_error(e),
    }
}

/// `POST /api/{provider}/accounts/{id}/disconnect`
pub async fn disconnect(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path((provider, id)): Path<(Provider, String)>,
) -> Response {
    if let Err(resp) = owned_account(&s, &session, provider, &id) {
        return resp;
    }
    match s.credentials.disconnect(provider, &id) {
        Ok(()) => Json(serde_json::json!({ "disconnected": true })).into_response(),
        Err(e) => credential_error(e),
    }
}
