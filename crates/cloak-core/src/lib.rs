// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Cloak secrets vault.
//!
//! Provides the error taxonomy, the value types shared by the vault and the
//! injector, name validation, and the [`KeyProvider`] collaborator trait.

pub mod error;
pub mod traits;
pub mod types;

pub use error::CloakError;
pub use traits::KeyProvider;
pub use types::{
    HISTORY_LIMIT, HistoryEntry, KeySource, REDACTION_MARKER, Scope, SecretMeta,
    VAULT_KEY_ENV_VAR, normalize_tags, validate_env_name, validate_secret_name,
};
