// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Linked-account persistence: the settings collaborator the broker writes
//! tokens through.

use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::credential::{CredentialRecord, LinkedAccount, Provider};
use crate::persist;

/// Storage for linked provider accounts and their credentials.
///
/// `write_credential` and `clear_credential` must be durable when they
/// return `Ok`; the broker treats an error as "the token was not stored".
pub trait CredentialStore: Send + Sync {
    fn list(&self) -> anyhow::Result<Vec<LinkedAccount>>;

    fn get(&self, provider: Provider, id: &str) -> anyhow::Result<Option<LinkedAccount>> {
        Ok(self.list()?.into_iter().find(|a| a.provider == provider && a.id == id))
    }

    /// Insert or replace an account by `(provider, id)`.
    fn upsert(&self, account: LinkedAccount) -> anyhow::Result<()>;

    fn write_credential(
        &self,
        provider: Provider,
        id: &str,
        record: CredentialRecord,
    ) -> anyhow::Result<()>;

    fn clear_credential(&self, provider: Provider, id: &str) -> anyhow::Result<()>;
}

/// Settings file layout.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub accounts: Vec<LinkedAccount>,
}

/// JSON settings file, rewritten atomically on every change.
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    fn read(&self) -> anyhow::Result<SettingsFile> {
        Ok(persist::load_json(&self.path)?.unwrap_or_default())
    }

    /// Read-modify-write under the store lock.
    fn update<T>(&self, f: impl FnOnce(&mut SettingsFile) -> anyhow::Result<T>) -> anyhow::Result<T> {
        let _guard = self.lock.lock();
        let mut file = self.read()?;
        let out = f(&mut file)?;
        persist::save_json(&self.path, &file)?;
        Ok(out)
    }
}

fn find_mut<'a>(
    file: &'a mut SettingsFile,
    provider: Provider,
    id: &str,
) -> anyhow::Result<&'a mut LinkedAccount> {
    file.accounts
        .iter_mut()
        .find(|a| a.provider == provider && a.id == id)
        .ok_or_else(|| anyhow::anyhow!("unknown {provider} account: {id}"))
}

impl CredentialStore for FileCredentialStore {
    fn list(&self) -> anyhow::Result<Vec<LinkedAccount>> {
        let _guard = self.lock.lock();
        Ok(self.read()?.accounts)
    }

    fn upsert(&self, account: LinkedAccount) -> anyhow::Result<()> {
        self.update(|file| {
            match file
                .accounts
                .iter_mut()
                .find(|a| a.provider == account.provider && a.id == account.id)
            {
                Some(existing) => *existing = account,
                None => file.accounts.push(account),
            }
            Ok(())
        })
    }

    fn write_credential(
        &self,
        provider: Provider,
        id: &str,
        record: CredentialRecord,
    ) -> anyhow::Result<()> {
        self.update(|file| {
            find_mut(file, provider, id)?.credential = Some(record);
            Ok(())
        })
    }

    fn clear_credential(&self, provider: Provider, id: &str) -> anyhow::Result<()> {
        self.update(|file| {
            find_mut(file, provider, id)?.credential = None;
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
