// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vault lifecycle: initialize, open, unlock, and the secret operations.
//!
//! Each secret is encrypted on its own with the vault key and a fresh IV.
//! Overwrites and rollbacks archive the live ciphertext byte-for-byte into
//! `secret_history` (no decrypt/re-encrypt), keeping the newest
//! [`HISTORY_LIMIT`] versions per name.
//!
//! A `Vault` starts without a key. Every operation that reads or writes
//! secret rows fails with [`CloakError::VaultLocked`] until [`Vault::unlock`]
//! has succeeded.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use cloak_core::{
    CloakError, HISTORY_LIMIT, HistoryEntry, KeyProvider, KeySource, SecretMeta, normalize_tags,
    validate_secret_name,
};
use rusqlite::{OptionalExtension, params};
use secrecy::{ExposeSecret, SecretString};
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::cipher::{self, KEY_LEN};
use crate::paths::{has_live_store, has_store, is_locked};
use crate::prompt::env_override;
use crate::store::{STORE_FILE, map_tr_err, open_store};

pub(crate) type VaultKey = Zeroizing<[u8; KEY_LEN]>;

/// `(ciphertext, iv, tags_json)` as stored.
type SealedRow = (Vec<u8>, Vec<u8>, String);

/// `(name, version, ciphertext, iv, tags_json, archived_at)` as stored.
type HistoryRow = (String, u32, Vec<u8>, Vec<u8>, String, String);

/// Outcome of [`Vault::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub path: PathBuf,
    pub key_source: KeySource,
    /// A new key was generated and handed to the provider.
    pub generated: bool,
}

/// Summary returned by [`Vault::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultStatus {
    pub path: PathBuf,
    pub secrets: usize,
    pub history_entries: usize,
    pub provider: String,
    pub key_source: Option<KeySource>,
}

/// One open store, with the vault key once unlocked.
pub struct Vault {
    dir: PathBuf,
    conn: Connection,
    provider: Box<dyn KeyProvider>,
    key: Option<VaultKey>,
    key_source: Option<KeySource>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("dir", &self.dir)
            .field("provider", &self.provider.name())
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .field("key_source", &self.key_source)
            .finish()
    }
}

/// Every key on offer, in preference order: provider, then `CLOAK_VAULT_KEY`.
pub(crate) async fn key_candidates(provider: &dyn KeyProvider) -> Vec<(VaultKey, KeySource)> {
    let mut candidates = Vec::with_capacity(2);
    match provider.retrieve().await {
        Ok(Some(material)) => candidates.push((
            cipher::derive_direct_key(material.expose_secret()),
            KeySource::Provider,
        )),
        Ok(None) => debug!(provider = provider.name(), "no key in provider"),
        Err(e) => warn!(provider = provider.name(), error = %e, "key provider failed"),
    }
    if let Some(material) = env_override() {
        candidates.push((
            cipher::derive_direct_key(material.expose_secret()),
            KeySource::EnvOverride,
        ));
    }
    candidates
}

/// The preferred key, unverified.
async fn current_key(provider: &dyn KeyProvider) -> Option<(VaultKey, KeySource)> {
    key_candidates(provider).await.into_iter().next()
}

impl Vault {
    /// Create an empty store in `dir` and settle who holds its key.
    ///
    /// An existing provider entry is reused; otherwise an available provider
    /// receives a freshly generated key. Without a provider the
    /// `CLOAK_VAULT_KEY` override becomes the key material.
    pub async fn initialize(
        dir: &Path,
        provider: &dyn KeyProvider,
    ) -> Result<InitReport, CloakError> {
        if has_store(dir) {
            return Err(CloakError::AlreadyExists {
                path: dir.to_path_buf(),
            });
        }

        let (key_source, new_key) = if provider.available().await {
            match provider.retrieve().await? {
                Some(_) => (KeySource::Provider, None),
                None => (KeySource::Provider, Some(cipher::generate_key()?)),
            }
        } else if env_override().is_some() {
            (KeySource::EnvOverride, None)
        } else {
            return Err(CloakError::NoKeyAvailable(format!(
                "key provider `{}` is unavailable on this host -- \
                 set {} to a vault key or password",
                provider.name(),
                cloak_core::VAULT_KEY_ENV_VAR
            )));
        };

        create_private_dir(dir).await?;
        let store_path = dir.join(STORE_FILE);
        let conn = open_store(&store_path).await?;
        conn.close().await.map_err(|e| CloakError::Storage { source: Box::new(e) })?;

        if let Some(key) = &new_key
            && let Err(e) = provider.store(&cipher::encode_key(key)).await
        {
            // Leave nothing behind that no key can open.
            let _ = tokio::fs::remove_file(&store_path).await;
            return Err(e);
        }

        info!(path = %dir.display(), key_source = %key_source, "vault created");
        Ok(InitReport {
            path: dir.to_path_buf(),
            key_source,
            generated: new_key.is_some(),
        })
    }

    /// Open the store in `dir`. The returned vault has no key yet.
    pub async fn open(dir: &Path, provider: Box<dyn KeyProvider>) -> Result<Self, CloakError> {
        if is_locked(dir) {
            return Err(CloakError::LockedAtRest {
                path: dir.to_path_buf(),
            });
        }
        if !has_live_store(dir) {
            return Err(CloakError::vault_not_found(dir));
        }

        let conn = open_store(&dir.join(STORE_FILE)).await?;
        Ok(Self {
            dir: dir.to_path_buf(),
            conn,
            provider,
            key: None,
            key_source: None,
        })
    }

    /// Obtain the vault key. Returns whether a key is now held; never errors.
    pub async fn unlock(&mut self) -> bool {
        if self.key.is_some() {
            return true;
        }
        match current_key(self.provider.as_ref()).await {
            Some((key, source)) => {
                self.key = Some(key);
                self.key_source = Some(source);
                debug!(path = %self.dir.display(), key_source = %source, "vault unlocked");
                true
            }
            None => {
                debug!(path = %self.dir.display(), "no vault key available");
                false
            }
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.key.is_some()
    }

    pub fn key_source(&self) -> Option<KeySource> {
        self.key_source
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn key(&self) -> Result<&[u8; KEY_LEN], CloakError> {
        self.key.as_deref().ok_or(CloakError::VaultLocked)
    }

    /// Encrypt and store `value` under `name`, archiving any previous value.
    ///
    /// `tags: None` keeps the existing tags (empty for a new secret).
    pub async fn set_secret(
        &self,
        name: &str,
        value: &str,
        tags: Option<&BTreeSet<String>>,
    ) -> Result<(), CloakError> {
        validate_secret_name(name)?;
        let (ciphertext, iv) = cipher::encrypt(value.as_bytes(), self.key()?)?;
        let tags_json = tags.map(|t| tags_to_json(&normalize_tags(t))).transpose()?;
        let now = now();
        let name_owned = name.to_string();

        let (archived, pruned) = self
            .conn
            .call(move |conn| -> Result<(Option<u32>, usize), rusqlite::Error> {
                let name = name_owned;
                let tx = conn.transaction()?;
                let existing: Option<(Vec<u8>, Vec<u8>, String, String)> = tx
                    .query_row(
                        "SELECT ciphertext, iv, tags, created_at FROM secrets WHERE name = ?1",
                        params![name],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                    )
                    .optional()?;

                let (archived, pruned, created_at, current_tags) = match existing {
                    Some((old_ct, old_iv, old_tags, created_at)) => {
                        let version =
                            archive_current(&tx, &name, &old_ct, &old_iv, &old_tags, &now)?;
                        let pruned = prune_history(&tx, &name)?;
                        (Some(version), pruned, created_at, old_tags)
                    }
                    None => (None, 0, now.clone(), "[]".to_string()),
                };

                tx.execute(
                    "INSERT OR REPLACE INTO secrets
                         (name, ciphertext, iv, tags, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        name,
                        ciphertext,
                        iv.to_vec(),
                        tags_json.unwrap_or(current_tags),
                        created_at,
                        now
                    ],
                )?;
                tx.commit()?;
                Ok((archived, pruned))
            })
            .await
            .map_err(map_tr_err)?;

        if let Some(version) = archived {
            debug!(name, version, "previous value archived");
        }
        if pruned > 0 {
            debug!(name, pruned, "history pruned");
        }
        info!(name, "secret stored");
        Ok(())
    }

    /// Decrypt the current value of `name`. `None` if absent.
    pub async fn get_secret(&self, name: &str) -> Result<Option<SecretString>, CloakError> {
        let key = self.key()?;
        let name = name.to_string();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<(Vec<u8>, Vec<u8>)>, rusqlite::Error> {
                conn.query_row(
                    "SELECT ciphertext, iv FROM secrets WHERE name = ?1",
                    params![name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)?;

        row.map(|(ciphertext, iv)| open_value(&ciphertext, &iv, key))
            .transpose()
    }

    /// Decrypt every requested name that exists; absent names are left out.
    pub async fn get_secrets<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<BTreeMap<String, SecretString>, CloakError> {
        let mut found = BTreeMap::new();
        for name in names {
            let name = name.as_ref();
            if let Some(value) = self.get_secret(name).await? {
                found.insert(name.to_string(), value);
            }
        }
        Ok(found)
    }

    /// Metadata for current secrets, by name ascending.
    ///
    /// With a filter, a secret is included when it carries any of the tags.
    pub async fn list_secrets(
        &self,
        filter: Option<&[String]>,
    ) -> Result<Vec<SecretMeta>, CloakError> {
        self.key()?;
        let rows = self
            .conn
            .call(|conn| -> Result<Vec<(String, String, String, String)>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name, tags, created_at, updated_at FROM secrets ORDER BY name ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?;
                rows.collect()
            })
            .await
            .map_err(map_tr_err)?;

        let filter: Option<BTreeSet<String>> = filter.map(normalize_tags);
        let mut metas = Vec::with_capacity(rows.len());
        for (name, tags, created_at, updated_at) in rows {
            let tags = tags_from_json(&tags)?;
            if let Some(wanted) = &filter
                && wanted.is_disjoint(&tags)
            {
                continue;
            }
            metas.push(SecretMeta {
                name,
                tags,
                created_at,
                updated_at,
            });
        }
        Ok(metas)
    }

    /// Current tags of `name`, or `None` if there is no such secret.
    pub async fn get_tags(&self, name: &str) -> Result<Option<BTreeSet<String>>, CloakError> {
        self.key()?;
        let name = name.to_string();
        let tags = self
            .conn
            .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
                conn.query_row(
                    "SELECT tags FROM secrets WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)?;
        tags.map(|t| tags_from_json(&t)).transpose()
    }

    /// Replace the tag set. `false` if there is no such secret.
    pub async fn set_tags<S: AsRef<str>>(
        &self,
        name: &str,
        tags: &[S],
    ) -> Result<bool, CloakError> {
        if self.get_tags(name).await?.is_none() {
            return Ok(false);
        }
        self.write_tags(name, normalize_tags(tags)).await
    }

    /// Union `tags` into the tag set. `false` if there is no such secret.
    pub async fn add_tags<S: AsRef<str>>(
        &self,
        name: &str,
        tags: &[S],
    ) -> Result<bool, CloakError> {
        let Some(mut current) = self.get_tags(name).await? else {
            return Ok(false);
        };
        current.extend(normalize_tags(tags));
        self.write_tags(name, current).await
    }

    /// Subtract `tags` from the tag set. `false` if there is no such secret.
    pub async fn remove_tags<S: AsRef<str>>(
        &self,
        name: &str,
        tags: &[S],
    ) -> Result<bool, CloakError> {
        let Some(mut current) = self.get_tags(name).await? else {
            return Ok(false);
        };
        for tag in normalize_tags(tags) {
            current.remove(&tag);
        }
        self.write_tags(name, current).await
    }

    async fn write_tags(&self, name: &str, tags: BTreeSet<String>) -> Result<bool, CloakError> {
        let tags_json = tags_to_json(&tags)?;
        let now = now();
        let name = name.to_string();
        let updated = self
            .conn
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "UPDATE secrets SET tags = ?1, updated_at = ?2 WHERE name = ?3",
                    params![tags_json, now, name],
                )
            })
            .await
            .map_err(map_tr_err)?;
        Ok(updated > 0)
    }

    /// Archived versions of `name`, most recent first.
    pub async fn get_history(&self, name: &str) -> Result<Vec<HistoryEntry>, CloakError> {
        self.key()?;
        let name = name.to_string();
        let rows = self
            .conn
            .call(move |conn| -> Result<Vec<HistoryRow>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name, version, ciphertext, iv, tags, archived_at
                     FROM secret_history WHERE name = ?1 ORDER BY version DESC",
                )?;
                let rows = stmt.query_map(params![name], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })?;
                rows.collect()
            })
            .await
            .map_err(map_tr_err)?;

        rows.into_iter()
            .map(|(name, version, ciphertext, iv, tags, archived_at)| {
                Ok(HistoryEntry {
                    name,
                    version,
                    ciphertext,
                    iv,
                    tags: tags_from_json(&tags)?,
                    archived_at,
                })
            })
            .collect()
    }

    /// Decrypt one archived version. `None` if that version does not exist.
    pub async fn get_history_version(
        &self,
        name: &str,
        version: u32,
    ) -> Result<Option<SecretString>, CloakError> {
        let key = self.key()?;
        let name = name.to_string();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<(Vec<u8>, Vec<u8>)>, rusqlite::Error> {
                conn.query_row(
                    "SELECT ciphertext, iv FROM secret_history WHERE name = ?1 AND version = ?2",
                    params![name, version],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)?;

        row.map(|(ciphertext, iv)| open_value(&ciphertext, &iv, key))
            .transpose()
    }

    /// Make archived `version` current again, archiving the value it replaces.
    ///
    /// `false` if the secret or the version does not exist. Ciphertext is
    /// copied as stored; nothing is decrypted.
    pub async fn rollback(&self, name: &str, version: u32) -> Result<bool, CloakError> {
        self.key()?;
        let now = now();
        let name_owned = name.to_string();
        let outcome = self
            .conn
            .call(move |conn| -> Result<Option<(u32, usize)>, rusqlite::Error> {
                let name = name_owned;
                let tx = conn.transaction()?;
                let current: Option<SealedRow> = tx
                    .query_row(
                        "SELECT ciphertext, iv, tags FROM secrets WHERE name = ?1",
                        params![name],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .optional()?;
                let target: Option<SealedRow> = tx
                    .query_row(
                        "SELECT ciphertext, iv, tags FROM secret_history
                         WHERE name = ?1 AND version = ?2",
                        params![name, version],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .optional()?;
                let (Some((cur_ct, cur_iv, cur_tags)), Some((ct, iv, tags))) = (current, target)
                else {
                    return Ok(None);
                };

                let archived = archive_current(&tx, &name, &cur_ct, &cur_iv, &cur_tags, &now)?;
                tx.execute(
                    "UPDATE secrets SET ciphertext = ?1, iv = ?2, tags = ?3, updated_at = ?4
                     WHERE name = ?5",
                    params![ct, iv, tags, now, name],
                )?;
                let pruned = prune_history(&tx, &name)?;
                tx.commit()?;
                Ok(Some((archived, pruned)))
            })
            .await
            .map_err(map_tr_err)?;

        match outcome {
            Some((archived, pruned)) => {
                info!(name, version, archived, pruned, "secret rolled back");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Delete every archived version of `name`. Returns how many were removed.
    pub async fn clear_history(&self, name: &str) -> Result<usize, CloakError> {
        self.key()?;
        let name_owned = name.to_string();
        let removed = self
            .conn
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "DELETE FROM secret_history WHERE name = ?1",
                    params![name_owned],
                )
            })
            .await
            .map_err(map_tr_err)?;
        debug!(name, removed, "history cleared");
        Ok(removed)
    }

    /// Delete the current value of `name`. History is kept.
    pub async fn remove_secret(&self, name: &str) -> Result<bool, CloakError> {
        self.key()?;
        let name_owned = name.to_string();
        let removed = self
            .conn
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute("DELETE FROM secrets WHERE name = ?1", params![name_owned])
            })
            .await
            .map_err(map_tr_err)?;
        if removed > 0 {
            info!(name, "secret removed");
        }
        Ok(removed > 0)
    }

    /// Row counts and key custody. Works without a key.
    pub async fn status(&self) -> Result<VaultStatus, CloakError> {
        let (secrets, history_entries) = self
            .conn
            .call(|conn| -> Result<(i64, i64), rusqlite::Error> {
                conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM secrets), (SELECT COUNT(*) FROM secret_history)",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
            })
            .await
            .map_err(map_tr_err)?;

        Ok(VaultStatus {
            path: self.dir.clone(),
            secrets: usize::try_from(secrets).unwrap_or_default(),
            history_entries: usize::try_from(history_entries).unwrap_or_default(),
            provider: self.provider.name().to_string(),
            key_source: self.key_source,
        })
    }

    /// Close the store connection, flushing it to disk.
    pub async fn close(self) -> Result<(), CloakError> {
        self.conn
            .close()
            .await
            .map_err(|e| CloakError::Storage { source: Box::new(e) })
    }
}

fn archive_current(
    conn: &rusqlite::Connection,
    name: &str,
    ciphertext: &[u8],
    iv: &[u8],
    tags: &str,
    now: &str,
) -> Result<u32, rusqlite::Error> {
    let version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM secret_history WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    conn.execute(
        "INSERT INTO secret_history (name, version, ciphertext, iv, tags, archived_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![name, version, ciphertext, iv, tags, now],
    )?;
    Ok(version)
}

fn prune_history(conn: &rusqlite::Connection, name: &str) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM secret_history WHERE name = ?1 AND version NOT IN (
             SELECT version FROM secret_history WHERE name = ?1 ORDER BY version DESC LIMIT ?2
         )",
        params![name, HISTORY_LIMIT as i64],
    )
}

fn open_value(
    ciphertext: &[u8],
    iv: &[u8],
    key: &[u8; KEY_LEN],
) -> Result<SecretString, CloakError> {
    let plaintext = Zeroizing::new(cipher::decrypt(ciphertext, iv, key)?);
    let value = std::str::from_utf8(&plaintext)
        .map_err(|_| CloakError::MalformedInput("decrypted value is not valid UTF-8".to_string()))?;
    Ok(SecretString::from(value.to_string()))
}

fn tags_to_json(tags: &BTreeSet<String>) -> Result<String, CloakError> {
    serde_json::to_string(tags).map_err(|e| CloakError::Storage { source: Box::new(e) })
}

fn tags_from_json(json: &str) -> Result<BTreeSet<String>, CloakError> {
    serde_json::from_str(json).map_err(|e| CloakError::Storage { source: Box::new(e) })
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

async fn create_private_dir(dir: &Path) -> Result<(), CloakError> {
    tokio::fs::create_dir_all(dir).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keychain::{MemoryKeyProvider, UnavailableKeyProvider};
    use cloak_core::VAULT_KEY_ENV_VAR;
    use serial_test::serial;
    use tempfile::tempdir;

    async fn fresh_vault(dir: &Path) -> Vault {
        let provider = MemoryKeyProvider::new("vault:test");
        Vault::initialize(dir, &provider).await.unwrap();
        let mut vault = Vault::open(dir, Box::new(provider)).await.unwrap();
        assert!(vault.unlock().await);
        vault
    }

    fn tags(list: &[&str]) -> BTreeSet<String> {
        normalize_tags(list)
    }

    #[tokio::test]
    async fn initialize_generates_and_stores_key() {
        let dir = tempdir().unwrap();
        let provider = MemoryKeyProvider::new("vault:init");
        let report = Vault::initialize(dir.path(), &provider).await.unwrap();

        assert!(report.generated);
        assert_eq!(report.key_source, KeySource::Provider);
        assert!(dir.path().join(STORE_FILE).exists());
        let stored = provider.retrieve().await.unwrap().unwrap();
        assert_eq!(cipher::derive_direct_key(stored.expose_secret()).len(), KEY_LEN);
    }

    #[tokio::test]
    async fn initialize_reuses_existing_key() {
        let dir = tempdir().unwrap();
        let provider = MemoryKeyProvider::new("vault:reuse");
        provider
            .store(&SecretString::from("existing".to_string()))
            .await
            .unwrap();
        let report = Vault::initialize(dir.path(), &provider).await.unwrap();
        assert!(!report.generated);
        assert_eq!(
            provider.retrieve().await.unwrap().unwrap().expose_secret(),
            "existing"
        );
    }

    #[tokio::test]
    async fn initialize_twice_fails() {
        let dir = tempdir().unwrap();
        let provider = MemoryKeyProvider::new("vault:twice");
        Vault::initialize(dir.path(), &provider).await.unwrap();
        assert!(matches!(
            Vault::initialize(dir.path(), &provider).await,
            Err(CloakError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    #[serial]
    async fn initialize_without_any_key_source_fails_before_creating() {
        unsafe { std::env::remove_var(VAULT_KEY_ENV_VAR) };
        let dir = tempdir().unwrap();
        let store_dir = dir.path().join("envs/default");
        let err = Vault::initialize(&store_dir, &UnavailableKeyProvider)
            .await
            .unwrap_err();
        assert!(matches!(err, CloakError::NoKeyAvailable(_)));
        assert!(!store_dir.exists());
    }

    #[tokio::test]
    #[serial]
    async fn env_override_unlocks_without_provider() {
        unsafe { std::env::set_var(VAULT_KEY_ENV_VAR, "ci-password") };
        let dir = tempdir().unwrap();
        let report = Vault::initialize(dir.path(), &UnavailableKeyProvider)
            .await
            .unwrap();
        assert_eq!(report.key_source, KeySource::EnvOverride);

        let mut vault = Vault::open(dir.path(), Box::new(UnavailableKeyProvider))
            .await
            .unwrap();
        let unlocked = vault.unlock().await;
        unsafe { std::env::remove_var(VAULT_KEY_ENV_VAR) };

        assert!(unlocked);
        assert_eq!(vault.key_source(), Some(KeySource::EnvOverride));
        vault.set_secret("CI_TOKEN", "t", None).await.unwrap();
        assert_eq!(
            vault.get_secret("CI_TOKEN").await.unwrap().unwrap().expose_secret(),
            "t"
        );
    }

    #[tokio::test]
    #[serial]
    async fn operations_fail_before_unlock() {
        unsafe { std::env::remove_var(VAULT_KEY_ENV_VAR) };
        let dir = tempdir().unwrap();
        let provider = MemoryKeyProvider::new("vault:locked");
        Vault::initialize(dir.path(), &provider).await.unwrap();
        provider.delete().await.unwrap();

        let mut vault = Vault::open(dir.path(), Box::new(provider)).await.unwrap();
        assert!(!vault.unlock().await);
        assert!(!vault.is_unlocked());
        assert!(matches!(
            vault.get_secret("A").await,
            Err(CloakError::VaultLocked)
        ));
        assert!(matches!(
            vault.set_secret("A", "x", None).await,
            Err(CloakError::VaultLocked)
        ));
        assert!(matches!(
            vault.list_secrets(None).await,
            Err(CloakError::VaultLocked)
        ));
        // Status needs no key.
        assert_eq!(vault.status().await.unwrap().secrets, 0);
    }

    #[tokio::test]
    async fn open_missing_store_is_not_found() {
        let dir = tempdir().unwrap();
        let err = Vault::open(dir.path(), Box::new(UnavailableKeyProvider))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn set_get_and_absent() {
        let dir = tempdir().unwrap();
        let vault = fresh_vault(dir.path()).await;

        vault.set_secret("API_KEY", "sk-123", None).await.unwrap();
        let value = vault.get_secret("API_KEY").await.unwrap().unwrap();
        assert_eq!(value.expose_secret(), "sk-123");
        assert!(vault.get_secret("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_name_rejected() {
        let dir = tempdir().unwrap();
        let vault = fresh_vault(dir.path()).await;
        assert!(matches!(
            vault.set_secret("lower", "x", None).await,
            Err(CloakError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn get_secrets_omits_missing() {
        let dir = tempdir().unwrap();
        let vault = fresh_vault(dir.path()).await;
        vault.set_secret("A", "1", None).await.unwrap();
        vault.set_secret("B", "2", None).await.unwrap();

        let found = vault.get_secrets(&["A", "C"]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["A"].expose_secret(), "1");
    }

    #[tokio::test]
    async fn overwrite_archives_identical_ciphertext() {
        let dir = tempdir().unwrap();
        let vault = fresh_vault(dir.path()).await;
        vault.set_secret("TOKEN", "v1", Some(&tags(&["ci"]))).await.unwrap();

        let before: SealedRow = vault
            .conn
            .call(|conn| -> Result<SealedRow, rusqlite::Error> {
                conn.query_row(
                    "SELECT ciphertext, iv, tags FROM secrets WHERE name = 'TOKEN'",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
            })
            .await
            .unwrap();

        vault.set_secret("TOKEN", "v2", None).await.unwrap();
        let history = vault.get_history("TOKEN").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, 1);
        assert_eq!(history[0].ciphertext, before.0);
        assert_eq!(history[0].iv, before.1);
        assert_eq!(history[0].tags, tags(&["ci"]));

        // Tags survive an overwrite without explicit tags.
        assert_eq!(vault.get_tags("TOKEN").await.unwrap().unwrap(), tags(&["ci"]));
    }

    #[tokio::test]
    async fn created_at_survives_overwrite() {
        let dir = tempdir().unwrap();
        let vault = fresh_vault(dir.path()).await;
        vault.set_secret("X", "1", None).await.unwrap();
        let first = vault.list_secrets(None).await.unwrap().remove(0);
        vault.set_secret("X", "2", None).await.unwrap();
        let second = vault.list_secrets(None).await.unwrap().remove(0);
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn tag_operations() {
        let dir = tempdir().unwrap();
        let vault = fresh_vault(dir.path()).await;
        vault.set_secret("DB_URL", "pg://", Some(&tags(&["db"]))).await.unwrap();

        assert!(vault.add_tags("DB_URL", &["prod", "db"]).await.unwrap());
        assert_eq!(
            vault.get_tags("DB_URL").await.unwrap().unwrap(),
            tags(&["db", "prod"])
        );

        assert!(vault.remove_tags("DB_URL", &["db"]).await.unwrap());
        assert_eq!(vault.get_tags("DB_URL").await.unwrap().unwrap(), tags(&["prod"]));

        assert!(vault.set_tags("DB_URL", &["x", "y"]).await.unwrap());
        assert_eq!(vault.get_tags("DB_URL").await.unwrap().unwrap(), tags(&["x", "y"]));

        assert!(!vault.set_tags("MISSING", &["x"]).await.unwrap());
        assert!(!vault.add_tags("MISSING", &["x"]).await.unwrap());
        assert!(!vault.remove_tags("MISSING", &["x"]).await.unwrap());
        assert!(vault.get_tags("MISSING").await.unwrap().is_none());

        // Tag edits do not archive.
        assert!(vault.get_history("DB_URL").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_version_decrypts() {
        let dir = tempdir().unwrap();
        let vault = fresh_vault(dir.path()).await;
        vault.set_secret("K", "old", None).await.unwrap();
        vault.set_secret("K", "new", None).await.unwrap();

        let old = vault.get_history_version("K", 1).await.unwrap().unwrap();
        assert_eq!(old.expose_secret(), "old");
        assert!(vault.get_history_version("K", 9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rollback_missing_returns_false() {
        let dir = tempdir().unwrap();
        let vault = fresh_vault(dir.path()).await;
        assert!(!vault.rollback("NOPE", 1).await.unwrap());

        vault.set_secret("K", "v1", None).await.unwrap();
        assert!(!vault.rollback("K", 1).await.unwrap());
        assert_eq!(
            vault.get_secret("K").await.unwrap().unwrap().expose_secret(),
            "v1"
        );
    }

    #[tokio::test]
    async fn remove_keeps_history_until_cleared() {
        let dir = tempdir().unwrap();
        let vault = fresh_vault(dir.path()).await;
        vault.set_secret("K", "v1", None).await.unwrap();
        vault.set_secret("K", "v2", None).await.unwrap();

        assert!(vault.remove_secret("K").await.unwrap());
        assert!(!vault.remove_secret("K").await.unwrap());
        assert!(vault.get_secret("K").await.unwrap().is_none());
        assert_eq!(vault.get_history("K").await.unwrap().len(), 1);

        assert_eq!(vault.clear_history("K").await.unwrap(), 1);
        assert!(vault.get_history("K").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_history_leaves_current_value() {
        let dir = tempdir().unwrap();
        let vault = fresh_vault(dir.path()).await;
        vault.set_secret("K", "v1", None).await.unwrap();
        vault.set_secret("K", "v2", None).await.unwrap();
        vault.clear_history("K").await.unwrap();
        assert_eq!(
            vault.get_secret("K").await.unwrap().unwrap().expose_secret(),
            "v2"
        );
    }

    #[tokio::test]
    async fn status_counts_rows() {
        let dir = tempdir().unwrap();
        let vault = fresh_vault(dir.path()).await;
        vault.set_secret("A", "1", None).await.unwrap();
        vault.set_secret("A", "2", None).await.unwrap();
        vault.set_secret("B", "1", None).await.unwrap();

        let status = vault.status().await.unwrap();
        assert_eq!(status.secrets, 2);
        assert_eq!(status.history_entries, 1);
        assert_eq!(status.provider, "memory");
        assert_eq!(status.key_source, Some(KeySource::Provider));
    }

    #[tokio::test]
    async fn debug_redacts_key() {
        let dir = tempdir().unwrap();
        let vault = fresh_vault(dir.path()).await;
        let debug = format!("{vault:?}");
        assert!(debug.contains("[REDACTED]"));
    }
}
