// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rand::Rng;

use crate::clock::{Clock, SystemClock};
use crate::session::snapshot::{self, SnapshotEntry};
use crate::session::{Session, SessionIdentity};

#[derive(Debug, Clone)]
struct SessionEntry {
    expiry_ms: u64,
    is_master: bool,
    account_id: String,
}

/// Concurrent map of opaque token -> session, mirrored to a snapshot file.
///
/// Mutations take the write lock; `validate`/`lookup` share the read lock.
/// Snapshot writes happen after the map lock is released, from a copy taken
/// under it. Each copy carries a generation; a write older than the one
/// already on disk is skipped, so the file never moves backwards.
pub struct SessionStore {
    sessions: RwLock<Sessions>,
    snapshot_path: Option<PathBuf>,
    /// Generation of the last snapshot written.
    written: Mutex<u64>,
    clock: Arc<dyn Clock>,
}

#[derive(Default)]
struct Sessions {
    map: HashMap<String, SessionEntry>,
    generation: u64,
}

impl Sessions {
    /// Bump the generation and copy the live entries for persisting.
    fn snapshot(&mut self) -> (u64, Vec<SnapshotEntry>) {
        self.generation += 1;
        (self.generation, snapshot_of(&self.map))
    }
}

impl SessionStore {
    /// Create a store persisted at `snapshot_path`.
    pub fn new(snapshot_path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(Sessions::default()),
            snapshot_path: Some(snapshot_path.into()),
            written: Mutex::new(0),
            clock,
        }
    }

    /// Create a store that never touches disk.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(Sessions::default()),
            snapshot_path: None,
            written: Mutex::new(0),
            clock,
        }
    }

    pub fn with_system_clock(snapshot_path: impl Into<PathBuf>) -> Self {
        Self::new(snapshot_path, Arc::new(SystemClock))
    }

    /// Issue a new session token valid for `duration`.
    ///
    /// A snapshot write failure is logged; the in-memory session stays valid.
    pub fn create(&self, identity: &SessionIdentity, duration: Duration) -> String {
        let token = generate_token();
        let now = self.clock.now_ms();
        let expiry_ms = now.saturating_add(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));

        let snapshot = {
            let mut sessions = self.sessions.write();
            sessions.map.retain(|_, e| e.expiry_ms > now);
            sessions.map.insert(
                token.clone(),
                SessionEntry {
                    expiry_ms,
                    is_master: identity.is_master,
                    account_id: identity.account_id.clone(),
                },
            );
            sessions.snapshot()
        };

        self.persist(snapshot);
        tracing::debug!(account = %identity.account_id, master = identity.is_master, "session created");
        token
    }

    /// True iff `token` exists and has not expired. Never extends the expiry.
    pub fn validate(&self, token: &str) -> bool {
        let now = self.clock.now_ms();
        self.sessions.read().map.get(token).is_some_and(|e| e.expiry_ms > now)
    }

    /// Resolve `token` to a copy of its live session.
    pub fn lookup(&self, token: &str) -> Option<Session> {
        let now = self.clock.now_ms();
        let sessions = self.sessions.read();
        let entry = sessions.map.get(token).filter(|e| e.expiry_ms > now)?;
        Some(Session {
            token: token.to_owned(),
            expiry_ms: entry.expiry_ms,
            is_master: entry.is_master,
            account_id: entry.account_id.clone(),
        })
    }

    /// Remove `token` if present. Revoking an unknown token is a no-op.
    pub fn revoke(&self, token: &str) {
        let now = self.clock.now_ms();
        let snapshot = {
            let mut sessions = self.sessions.write();
            let removed = sessions.map.remove(token).is_some();
            let before = sessions.map.len();
            sessions.map.retain(|_, e| e.expiry_ms > now);
            if !removed && before == sessions.map.len() {
                return;
            }
            sessions.snapshot()
        };
        self.persist(snapshot);
    }

    /// Remove every session belonging to `account_id` (password reset,
    /// account deletion). Returns how many were removed.
    pub fn revoke_account(&self, account_id: &str) -> usize {
        let now = self.clock.now_ms();
        let (removed, snapshot) = {
            let mut sessions = self.sessions.write();
            let before = sessions.map.len();
            sessions.map.retain(|_, e| e.account_id != account_id);
            let removed = before - sessions.map.len();
            sessions.map.retain(|_, e| e.expiry_ms > now);
            (removed, sessions.snapshot())
        };
        if removed > 0 {
            self.persist(snapshot);
            tracing::info!(account = %account_id, removed, "revoked account sessions");
        }
        removed
    }

    /// Populate the store from the snapshot file, dropping expired entries.
    ///
    /// Returns the number of sessions loaded. A missing file loads nothing;
    /// an unreadable one is logged and ignored.
    pub fn load_from_disk(&self) -> usize {
        let Some(ref path) = self.snapshot_path else {
            return 0;
        };
        let entries = match snapshot::load(path) {
            Ok(Some(entries)) => entries,
            Ok(None) => return 0,
            Err(e) => {
                tracing::warn!(path = %path.display(), err = %e, "failed to load session snapshot");
                return 0;
            }
        };

        let now = self.clock.now_ms();
        let total = entries.len();
        let mut loaded = 0;
        let mut sessions = self.sessions.write();
        for entry in entries.into_iter().filter(|e| e.expiry > now) {
            loaded += 1;
            sessions.map.insert(
                entry.token,
                SessionEntry {
                    expiry_ms: entry.expiry,
                    is_master: entry.is_master,
                    account_id: entry.account_id,
                },
            );
        }
        drop(sessions);
        tracing::info!(loaded, dropped = total - loaded, "session snapshot loaded");
        loaded
    }

    /// Number of sessions held in memory (including any not yet swept).
    pub fn len(&self) -> usize {
        self.sessions.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().map.is_empty()
    }

    fn persist(&self, (generation, entries): (u64, Vec<SnapshotEntry>)) {
        let Some(ref path) = self.snapshot_path else {
            return;
        };
        let mut written = self.written.lock();
        if generation < *written {
            return;
        }
        *written = generation;
        if let Err(e) = snapshot::save(path, &entries) {
            tracing::warn!(path = %path.display(), err = %e, "failed to persist session snapshot");
        }
    }
}

/// 32 random bytes, hex-encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

fn snapshot_of(sessions: &HashMap<String, SessionEntry>) -> Vec<SnapshotEntry> {
    let mut entries: Vec<SnapshotEntry> = sessions
        .iter()
        .map(|(token, e)| SnapshotEntry {
            token: token.clone(),
            expiry: e.expiry_ms,
            account_id: e.account_id.clone(),
            is_master: e.is_master,
        })
        .collect();
    entries.sort_by(|a, b| a.expiry.cmp(&b.expiry).then_with(|| a.token.cmp(&b.token)));
    entries
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
