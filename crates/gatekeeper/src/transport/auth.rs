// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session validator middleware.
//!
//! Four gates: any session or master-only, each in an API flavor (401/403
//! JSON errors) and an interactive flavor (303 redirects). On success the
//! resolved [`Session`] is attached to the request extensions so handlers
//! never re-parse the cookie.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use crate::error::ApiError;
use crate::session::Session;
use crate::state::AppState;
use crate::transport::cookie;

pub const LOGIN_PATH: &str = "/login";
pub const ACCOUNT_PATH: &str = "/account";

/// Resolve the cookie-carried token to a live session with an identity.
pub fn resolve_session(state: &AppState, headers: &HeaderMap) -> Option<Session> {
    let token = cookie::session_token(headers)?;
    let session = state.sessions.lookup(token)?;
    // Snapshots written before identities were stored carry no account.
    if session.account_id.is_empty() {
        return None;
    }
    Some(session)
}

fn attach(mut req: Request<axum::body::Body>, session: Session) -> Request<axum::body::Body> {
    req.extensions_mut().insert(session);
    req
}

/// API gate: any authenticated session, else 401.
pub async fn require_session_api(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    match resolve_session(&state, req.headers()) {
        Some(session) => next.run(attach(req, session)).await,
        None => ApiError::Unauthorized.into_response_with("login required"),
    }
}

/// API gate: master sessions only. 401 without a session, 403 for non-master.
pub async fn require_master_api(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    match resolve_session(&state, req.headers()) {
        Some(session) if session.is_master => next.run(attach(req, session)).await,
        Some(session) => {
            tracing::debug!(account = %session.account_id, path = %req.uri().path(), "master route denied");
            ApiError::Forbidden.into_response_with("master account required")
        }
        None => ApiError::Unauthorized.into_response_with("login required"),
    }
}

/// Interactive gate: any authenticated session, else redirect to the login page.
pub async fn require_session_page(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    match resolve_session(&state, req.headers()) {
        Some(session) => next.run(attach(req, session)).await,
        None => Redirect::to(LOGIN_PATH).into_response(),
    }
}

/// Interactive gate: master sessions only. Non-master sessions land on their
/// own account page.
pub async fn require_master_page(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    match resolve_session(&state, req.headers()) {
        Some(session) if session.is_master => next.run(attach(req, session)).await,
        Some(_) => Redirect::to(ACCOUNT_PATH).into_response(),
        None => Redirect::to(LOGIN_PATH).into_response(),
    }
}
