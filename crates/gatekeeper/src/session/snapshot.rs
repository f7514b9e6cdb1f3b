// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session snapshot file: a JSON array of `{token, expiry, ...}` objects.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// One persisted session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub token: String,
    /// Expiry as epoch milliseconds.
    pub expiry: u64,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub is_master: bool,
}

/// Load the snapshot. A missing file is a fresh install, not an error.
pub fn load(path: &Path) -> anyhow::Result<Option<Vec<SnapshotEntry>>> {
    crate::persist::load_json(path)
}

pub fn save(path: &Path, entries: &[SnapshotEntry]) -> anyhow::Result<()> {
    crate::persist::save_json(path, entries)
}
