// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Custodian of one vault key per store directory.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::CloakError;

/// Stores, retrieves, and deletes the data-encryption key for one vault.
///
/// Keys cross this boundary as base64 text of the 32 raw bytes. Backends must
/// not consult `CLOAK_VAULT_KEY`; the override is the vault layer's fallback.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Short backend name for logs and status output.
    fn name(&self) -> &str;

    /// Whether the backend can be used on this host right now.
    async fn available(&self) -> bool;

    /// Persist `key`, replacing any existing entry.
    async fn store(&self, key: &SecretString) -> Result<(), CloakError>;

    /// Fetch the stored key. `Ok(None)` means no entry exists.
    async fn retrieve(&self) -> Result<Option<SecretString>, CloakError>;

    /// Remove the stored key. Deleting a missing entry succeeds.
    async fn delete(&self) -> Result<(), CloakError>;
}
