// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Whole-store encryption at rest under a travel password.
//!
//! The locked artifact is `salt(16) || iv(12) || AEAD(payload)` where
//! `payload = u32le(key_len) || key || store_file_bytes`. Embedding the vault
//! key lets a machine without the original credential-store entry unlock it.
//!
//! Which file exists (`vault.db` or `vault.locked`) is the only lock-state
//! signal. There is no inter-process lock around the swap: a concurrent
//! writer during `lock`/`unlock` can lose data.

use std::path::{Path, PathBuf};

use cloak_core::{CloakError, KeyProvider, KeySource, VAULT_KEY_ENV_VAR};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::cipher::{self, KEY_LEN};
use crate::paths::has_live_store;
use crate::prompt::env_override;
use crate::store::{
    JOURNAL_FILE, LOCKED_FILE, STORE_FILE, SealedValue, open_store, sample_ciphertext,
};
use crate::vault::{VaultKey, key_candidates};

const LEN_PREFIX: usize = 4;

/// Outcome of [`VaultLock::lock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockReport {
    /// The locked artifact written.
    pub path: PathBuf,
    /// Where the embedded key came from.
    pub key_source: KeySource,
    /// Whether the provider entry was deleted. Only a provider-sourced key is
    /// deleted, and a failed delete is not fatal.
    pub provider_cleared: bool,
}

/// Outcome of [`VaultLock::unlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// There was no artifact and the live store is present.
    AlreadyUnlocked,
    /// The store was restored; `key_restored` says whether the provider holds the key again.
    Unlocked { key_restored: bool },
}

/// Lock and unlock the store in one directory.
pub struct VaultLock {
    dir: PathBuf,
    provider: Box<dyn KeyProvider>,
}

impl std::fmt::Debug for VaultLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultLock")
            .field("dir", &self.dir)
            .field("provider", &self.provider.name())
            .finish()
    }
}

impl VaultLock {
    pub fn new(dir: impl Into<PathBuf>, provider: Box<dyn KeyProvider>) -> Self {
        Self {
            dir: dir.into(),
            provider,
        }
    }

    fn locked_path(&self) -> PathBuf {
        self.dir.join(LOCKED_FILE)
    }

    fn store_path(&self) -> PathBuf {
        self.dir.join(STORE_FILE)
    }

    /// Replace the live store with a password-encrypted artifact and drop
    /// the provider's key entry.
    ///
    /// The embedded key must open the store: each candidate key is tried
    /// against a stored ciphertext first. Fails before touching any file
    /// when the store is missing, already locked, or no candidate fits.
    pub async fn lock(&self, password: &SecretString) -> Result<LockReport, CloakError> {
        let locked_path = self.locked_path();
        if locked_path.exists() {
            return Err(CloakError::AlreadyLocked {
                path: self.dir.clone(),
            });
        }
        if !has_live_store(&self.dir) {
            return Err(CloakError::vault_not_found(&self.dir));
        }

        // Opening the store replays a hot journal into `vault.db`.
        let store_path = self.store_path();
        let conn = open_store(&store_path).await?;
        let sample = sample_ciphertext(&conn).await?;
        conn.close()
            .await
            .map_err(|e| CloakError::Storage { source: Box::new(e) })?;

        let (key, key_source) = self.verified_key(sample.as_ref()).await?;

        let store_bytes = Zeroizing::new(tokio::fs::read(&store_path).await?);
        let mut payload =
            Zeroizing::new(Vec::with_capacity(LEN_PREFIX + KEY_LEN + store_bytes.len()));
        payload.extend_from_slice(&(KEY_LEN as u32).to_le_bytes());
        payload.extend_from_slice(key.as_slice());
        payload.extend_from_slice(&store_bytes);

        let blob = cipher::encrypt_blob(&payload, password)?;
        write_replacing(&locked_path, &blob).await?;

        tokio::fs::remove_file(&store_path).await?;
        remove_if_present(&self.dir.join(JOURNAL_FILE)).await?;

        let provider_cleared = if key_source == KeySource::Provider {
            match self.provider.delete().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        provider = self.provider.name(),
                        error = %e,
                        "could not delete key from provider"
                    );
                    false
                }
            }
        } else {
            false
        };

        info!(path = %locked_path.display(), key_source = %key_source, "vault locked");
        Ok(LockReport {
            path: locked_path,
            key_source,
            provider_cleared,
        })
    }

    /// The first candidate key that decrypts `sample`. An empty store has
    /// nothing to check against, so the preferred key wins.
    async fn verified_key(
        &self,
        sample: Option<&SealedValue>,
    ) -> Result<(VaultKey, KeySource), CloakError> {
        let candidates = key_candidates(self.provider.as_ref()).await;
        let Some((ciphertext, iv)) = sample else {
            return candidates.into_iter().next().ok_or_else(|| self.no_key());
        };
        if candidates.is_empty() {
            return Err(self.no_key());
        }

        for (key, source) in candidates {
            match cipher::decrypt(ciphertext, iv, &key) {
                Ok(plaintext) => {
                    drop(Zeroizing::new(plaintext));
                    return Ok((key, source));
                }
                Err(_) => warn!(key_source = %source, "candidate key does not open this store"),
            }
        }
        Err(CloakError::AuthFailed(format!(
            "no available key opens the store in {}",
            self.dir.display()
        )))
    }

    fn no_key(&self) -> CloakError {
        CloakError::NoKeyAvailable(format!(
            "no key for {} in `{}` and {VAULT_KEY_ENV_VAR} is not set",
            self.dir.display(),
            self.provider.name()
        ))
    }

    /// Restore the live store from the artifact and hand the key back to the
    /// provider.
    ///
    /// A wrong password is `AuthFailed` and leaves the artifact in place. The
    /// artifact is removed only after the store and key are both restored.
    pub async fn unlock(&self, password: &SecretString) -> Result<UnlockOutcome, CloakError> {
        let locked_path = self.locked_path();
        let live = has_live_store(&self.dir);
        if !locked_path.exists() {
            if live {
                debug!(path = %self.dir.display(), "vault already unlocked");
                return Ok(UnlockOutcome::AlreadyUnlocked);
            }
            return Err(CloakError::vault_not_found(&self.dir));
        }
        if live {
            return Err(CloakError::AlreadyExists {
                path: self.store_path(),
            });
        }

        let blob = tokio::fs::read(&locked_path).await?;
        let payload = cipher::decrypt_blob(&blob, password)?;
        let (key, store_bytes) = split_payload(&payload)?;

        let provider_available = self.provider.available().await;
        if !provider_available && !override_matches(&key) {
            return Err(CloakError::NoKeyAvailable(format!(
                "key provider `{}` is unavailable and {VAULT_KEY_ENV_VAR} \
                 does not hold this vault's key",
                self.provider.name()
            )));
        }

        let store_path = self.store_path();
        write_replacing(&store_path, store_bytes).await?;

        let key_restored = if provider_available {
            if let Err(e) = self.provider.store(&cipher::encode_key(&key)).await {
                let _ = tokio::fs::remove_file(&store_path).await;
                return Err(e);
            }
            true
        } else {
            warn!(
                provider = self.provider.name(),
                "key provider unavailable -- vault key stays with {VAULT_KEY_ENV_VAR}"
            );
            false
        };

        tokio::fs::remove_file(&locked_path).await?;
        info!(path = %store_path.display(), key_restored, "vault unlocked from artifact");
        Ok(UnlockOutcome::Unlocked { key_restored })
    }
}

fn split_payload(payload: &[u8]) -> Result<(VaultKey, &[u8]), CloakError> {
    if payload.len() < LEN_PREFIX {
        return Err(CloakError::MalformedInput(
            "locked payload is missing its key length".to_string(),
        ));
    }
    let (prefix, rest) = payload.split_at(LEN_PREFIX);
    let mut len_bytes = [0u8; LEN_PREFIX];
    len_bytes.copy_from_slice(prefix);
    let key_len = u32::from_le_bytes(len_bytes) as usize;

    if key_len > rest.len() {
        return Err(CloakError::MalformedInput(format!(
            "locked payload declares a {key_len}-byte key but holds {} bytes",
            rest.len()
        )));
    }
    if key_len != KEY_LEN {
        return Err(CloakError::MalformedInput(format!(
            "embedded key is {key_len} bytes, expected {KEY_LEN}"
        )));
    }

    let (key_bytes, store_bytes) = rest.split_at(KEY_LEN);
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(key_bytes);
    Ok((key, store_bytes))
}

fn override_matches(key: &[u8; KEY_LEN]) -> bool {
    env_override()
        .map(|material| *cipher::derive_direct_key(material.expose_secret()) == *key)
        .unwrap_or(false)
}

/// Write `bytes` to a sibling temp file, then rename over `path`.
async fn write_replacing(path: &Path, bytes: &[u8]) -> Result<(), CloakError> {
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp, bytes).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
    }
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn remove_if_present(path: &Path) -> Result<(), CloakError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
