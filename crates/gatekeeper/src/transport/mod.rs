// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport: public, session-gated, and master-gated route groups.

pub mod auth;
pub mod cookie;
pub mod http;
pub mod http_cred;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with all gatekeeper routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    // No session required.
    let public = Router::new()
        .route("/api/health", get(http::health))
        .route("/api/login", post(http::login))
        .route("/login", get(http::login_page))
        .route("/logout", post(http::logout));

    // Any session, JSON errors.
    let api = Router::new()
        .route("/api/session", get(http::session_info))
        .route("/api/profiles", get(http::profiles))
        .route("/api/streams", get(http::streams))
        .route("/api/credentials", get(http_cred::list_accounts))
        .route("/api/{provider}/accounts", post(http_cred::create_account))
        .route("/api/{provider}/accounts/{id}/auth/start", post(http_cred::start_auth))
        .route("/api/{provider}/accounts/{id}/auth/check/{handle}", get(http_cred::check_auth))
        .route("/api/{provider}/accounts/{id}/token", get(http_cred::access_token))
        .route("/api/{provider}/accounts/{id}/rejected", post(http_cred::report_rejected))
        .route("/api/{provider}/accounts/{id}/disconnect", post(http_cred::disconnect))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_session_api));

    // Master only, JSON errors.
    let admin_api = Router::new()
        .route("/api/admin/accounts/{id}/sessions", delete(http::revoke_account_sessions))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_master_api));

    // Interactive pages, redirects.
    let account_page = Router::new()
        .route("/account", get(http::account_page))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_session_page));
    let admin_page = Router::new()
        .route("/admin", get(http::admin_page))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_master_page));

    Router::new()
        .merge(public)
        .merge(api)
        .merge(admin_api)
        .merge(account_page)
        .merge(admin_page)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
