// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Account, profile and stream collaborators.
//!
//! These are owned by other services; the gate only needs to authenticate a
//! login, and to list profiles and streams scoped to an account.

use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A login account as seen by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAccount {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub is_master: bool,
}

/// A viewer profile owned by a login account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub account_id: String,
    pub name: String,
}

/// A read-only snapshot of an active stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub id: String,
    /// `hls` or `direct`.
    pub kind: String,
    pub profile_id: String,
    pub filename: String,
    #[serde(default)]
    pub bytes_streamed: u64,
}

pub trait AccountDirectory: Send + Sync {
    /// Check a username/password pair.
    fn authenticate(&self, username: &str, password: &str) -> Option<LoginAccount>;
    fn get(&self, id: &str) -> Option<LoginAccount>;
}

pub trait ProfileDirectory: Send + Sync {
    fn list_all(&self) -> Vec<Profile>;

    fn list_for_account(&self, account_id: &str) -> Vec<Profile> {
        self.list_all().into_iter().filter(|p| p.account_id == account_id).collect()
    }

    fn belongs_to(&self, profile_id: &str, account_id: &str) -> bool {
        self.list_all().iter().any(|p| p.id == profile_id && p.account_id == account_id)
    }
}

pub trait StreamSource: Send + Sync {
    fn active_streams(&self) -> Vec<StreamInfo>;
}

/// Accounts file layout.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DirectoryFile {
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountEntry {
    pub id: String,
    pub username: String,
    /// Hex SHA-256 of the password.
    pub password_sha256: String,
    #[serde(default)]
    pub is_master: bool,
}

impl AccountEntry {
    pub fn new(id: &str, username: &str, password: &str, is_master: bool) -> Self {
        Self {
            id: id.to_owned(),
            username: username.to_owned(),
            password_sha256: password_digest(password),
            is_master,
        }
    }
}

/// In-process directory backing all three collaborator traits.
#[derive(Default)]
pub struct StaticDirectory {
    accounts: Vec<AccountEntry>,
    profiles: Vec<Profile>,
    streams: RwLock<Vec<StreamInfo>>,
}

impl StaticDirectory {
    pub fn new(file: DirectoryFile) -> Self {
        Self { accounts: file.accounts, profiles: file.profiles, streams: RwLock::new(vec![]) }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let file: DirectoryFile = serde_json::from_str(&contents)?;
        Ok(Self::new(file))
    }

    /// Replace the current stream snapshot.
    pub fn set_streams(&self, streams: Vec<StreamInfo>) {
        *self.streams.write() = streams;
    }
}

impl AccountDirectory for StaticDirectory {
    fn authenticate(&self, username: &str, password: &str) -> Option<LoginAccount> {
        let digest = password_digest(password);
        let entry = self.accounts.iter().find(|a| a.username.eq_ignore_ascii_case(username))?;
        if !constant_time_eq(&entry.password_sha256.to_ascii_lowercase(), &digest) {
            return None;
        }
        Some(LoginAccount {
            id: entry.id.clone(),
            username: entry.username.clone(),
            is_master: entry.is_master,
        })
    }

    fn get(&self, id: &str) -> Option<LoginAccount> {
        self.accounts.iter().find(|a| a.id == id).map(|a| LoginAccount {
            id: a.id.clone(),
            username: a.username.clone(),
            is_master: a.is_master,
        })
    }
}

impl ProfileDirectory for StaticDirectory {
    fn list_all(&self) -> Vec<Profile> {
        self.profiles.clone()
    }
}

impl StreamSource for StaticDirectory {
    fn active_streams(&self) -> Vec<StreamInfo> {
        self.streams.read().clone()
    }
}

pub fn password_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Constant-time string comparison to prevent timing side-channel attacks.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

#[cfg(test)]
#[path = "directory_tests.rs"]
mod tests;
