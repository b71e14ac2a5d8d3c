// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the vault, lock, and injector crates.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CloakError;

/// Maximum number of archived versions retained per secret name.
pub const HISTORY_LIMIT: usize = 10;

/// Environment variable carrying the direct vault key or the lock password.
pub const VAULT_KEY_ENV_VAR: &str = "CLOAK_VAULT_KEY";

/// Placeholder written over every redacted secret occurrence.
pub const REDACTION_MARKER: &str = "[REDACTED]";

static SECRET_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("static regex"));

static ENV_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("static regex"));

/// Where a vault lives: the user's home or the current project directory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    Local,
}

/// Which custodian supplied the in-memory vault key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum KeySource {
    /// Retrieved from the configured [`KeyProvider`](crate::KeyProvider).
    Provider,
    /// Derived from the `CLOAK_VAULT_KEY` environment variable.
    EnvOverride,
}

/// Metadata for a current secret. Never carries the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretMeta {
    pub name: String,
    pub tags: BTreeSet<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// An archived prior ciphertext for a secret name.
#[derive(Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub name: String,
    pub version: u32,
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    pub tags: BTreeSet<String>,
    pub archived_at: String,
}

impl std::fmt::Debug for HistoryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryEntry")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("tags", &self.tags)
            .field("archived_at", &self.archived_at)
            .finish_non_exhaustive()
    }
}

/// Check a secret name against `^[A-Z][A-Z0-9_]*$`.
pub fn validate_secret_name(name: &str) -> Result<(), CloakError> {
    if SECRET_NAME.is_match(name) {
        Ok(())
    } else {
        Err(CloakError::InvalidName(format!(
            "`{name}` -- secret names must be upper-case letters, digits and underscores, \
             starting with a letter"
        )))
    }
}

/// Check an environment name; it becomes a directory component, so no separators.
pub fn validate_env_name(name: &str) -> Result<(), CloakError> {
    if ENV_NAME.is_match(name) {
        Ok(())
    } else {
        Err(CloakError::InvalidName(format!(
            "`{name}` -- environment names must be alphanumeric, `-` or `_`"
        )))
    }
}

/// Normalize a tag list: trim, drop empties, deduplicate.
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
