// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for login, logout, and session-scoped reads.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::directory::{Profile, StreamInfo};
use crate::error::ApiError;
use crate::session::{Session, SessionIdentity};
use crate::state::AppState;
use crate::transport::auth::LOGIN_PATH;
use crate::transport::cookie;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub session_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub account_id: String,
    pub is_master: bool,
    /// Session lifetime in seconds.
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSummary {
    pub account_id: String,
    pub active_sessions: usize,
    pub active_streams: usize,
    pub profiles: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub account_id: String,
    pub username: String,
    pub is_master: bool,
    pub profiles: Vec<Profile>,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub account_id: String,
    pub revoked: usize,
}

const LOGIN_HTML: &str = "<!doctype html><title>Sign in</title>\
<p>POST your username and password to <code>/api/login</code>.</p>";

// -- Handlers -----------------------------------------------------------------

/// `GET /api/health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse { status: "running".to_owned(), session_count: s.sessions.len() })
}

/// `GET /login`
pub async fn login_page() -> impl IntoResponse {
    Html(LOGIN_HTML)
}

/// `POST /api/login`: check credentials, issue a session, set the cookie.
pub async fn login(
    State(s): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let Some(account) = s.accounts.authenticate(&req.username, &req.password) else {
        tracing::info!(username = %req.username, "login rejected");
        return ApiError::Unauthorized.into_response_with("invalid username or password");
    };

    let ttl = if req.remember { s.config.remember_ttl() } else { s.config.session_ttl() };
    let identity = SessionIdentity { account_id: account.id.clone(), is_master: account.is_master };
    let token = s.sessions.create(&identity, ttl);
    tracing::info!(account = %account.id, master = account.is_master, remember = req.remember, "login");

    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie::set_session(&token, ttl))],
        Json(LoginResponse {
            account_id: account.id,
            is_master: account.is_master,
            expires_in: ttl.as_secs(),
        }),
    )
        .into_response()
}

/// `POST /logout`: revoke the session (if any), clear the cookie, back to login.
pub async fn logout(State(s): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = cookie::session_token(&headers) {
        s.sessions.revoke(token);
        tracing::info!("logout");
    }
    ([(header::SET_COOKIE, cookie::clear_session())], Redirect::to(LOGIN_PATH))
}

/// `GET /api/session`
pub async fn session_info(Extension(session): Extension<Session>) -> impl IntoResponse {
    Json(session)
}

/// Profiles the session may see: all for master, otherwise its own.
fn visible_profiles(s: &AppState, session: &Session) -> Vec<Profile> {
    if session.is_master {
        s.profiles.list_all()
    } else {
        s.profiles.list_for_account(&session.account_id)
    }
}

/// `GET /api/profiles`
pub async fn profiles(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> impl IntoResponse {
    Json(visible_profiles(&s, &session))
}

/// `GET /api/streams`: active streams, limited to the session's own profiles
/// unless master.
pub async fn streams(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> impl IntoResponse {
    let all = s.streams.active_streams();
    if session.is_master {
        return Json(all);
    }
    let mine: HashSet<String> =
        s.profiles.list_for_account(&session.account_id).into_iter().map(|p| p.id).collect();
    let visible: Vec<StreamInfo> =
        all.into_iter().filter(|stream| mine.contains(&stream.profile_id)).collect();
    Json(visible)
}

/// `GET /admin`
pub async fn admin_page(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> impl IntoResponse {
    Json(AdminSummary {
        account_id: session.account_id,
        active_sessions: s.sessions.len(),
        active_streams: s.streams.active_streams().len(),
        profiles: s.profiles.list_all().len(),
    })
}

/// `GET /account`
pub async fn account_page(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> impl IntoResponse {
    let username =
        s.accounts.get(&session.account_id).map(|a| a.username).unwrap_or_default();
    Json(AccountSummary {
        profiles: visible_profiles(&s, &session),
        account_id: session.account_id,
        username,
        is_master: session.is_master,
    })
}

/// `DELETE /api/admin/accounts/{id}/sessions`: sign an account out everywhere.
pub async fn revoke_account_sessions(
    State(s): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(account_id): Path<String>,
) -> impl IntoResponse {
    let revoked = s.sessions.revoke_account(&account_id);
    tracing::info!(account = %account_id, by = %session.account_id, revoked, "sessions revoked");
    Json(RevokeResponse { account_id, revoked })
}
