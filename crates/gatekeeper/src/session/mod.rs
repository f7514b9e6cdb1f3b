// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! First-party login sessions: an explicitly constructed store persisted to a
//! snapshot file, plus the session record handed to request handlers.

pub mod snapshot;
pub mod store;

use serde::Serialize;

pub use store::SessionStore;

/// Who a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub account_id: String,
    pub is_master: bool,
}

impl SessionIdentity {
    pub fn master(account_id: impl Into<String>) -> Self {
        Self { account_id: account_id.into(), is_master: true }
    }

    pub fn account(account_id: impl Into<String>) -> Self {
        Self { account_id: account_id.into(), is_master: false }
    }
}

/// A resolved session. Consumers receive copies; the store owns the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(skip)]
    pub token: String,
    /// Expiry as epoch milliseconds.
    pub expiry_ms: u64,
    pub is_master: bool,
    pub account_id: String,
}

impl Session {
    /// Whether this session may act on data owned by `account_id`.
    pub fn can_access(&self, account_id: &str) -> bool {
        self.is_master || self.account_id == account_id
    }
}
