// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Cloak secrets vault.
//!
//! Display strings never carry plaintext, key material, or ciphertext.

use std::path::PathBuf;

use thiserror::Error;

/// The primary error type shared by every Cloak crate.
#[derive(Debug, Error)]
pub enum CloakError {
    /// A secret-bearing operation was attempted before `Vault::unlock` succeeded.
    #[error("vault is locked -- unlock it before reading or writing secrets")]
    VaultLocked,

    /// Wrong password, tampered data, or no usable key for decryption.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// A secret, history version, or vault path does not exist.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// Named-mode resolution could not find these secrets in the vault or environment.
    #[error("missing secrets: {}", names.join(", "))]
    MissingSecrets { names: Vec<String> },

    /// Input too short or structurally invalid (locked artifact framing, key length).
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The child process could not be spawned.
    #[error("failed to execute `{command}`: {source}")]
    ExecFailed {
        command: String,
        source: std::io::Error,
    },

    /// Neither the key provider nor the override variable can supply the vault key.
    #[error("no vault key available: {0}")]
    NoKeyAvailable(String),

    /// A vault store already exists where one was about to be created.
    #[error("vault already exists at {}", path.display())]
    AlreadyExists { path: PathBuf },

    /// The store is encrypted at rest and must be unlocked with its password first.
    #[error("vault at {} is locked at rest -- run `cloak unlock` first", path.display())]
    LockedAtRest { path: PathBuf },

    /// `lock` was requested for a store that already has a locked artifact.
    #[error("vault at {} is already locked", path.display())]
    AlreadyLocked { path: PathBuf },

    /// A secret or environment name does not match the allowed pattern.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// The OS credential store (or its command-line bridge) reported a failure.
    #[error("key provider error: {0}")]
    KeyProvider(String),

    /// Store backend errors (connection, query, migration, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Filesystem errors outside the store connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors surfaced at runtime.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CloakError {
    /// Shorthand for a missing secret.
    pub fn secret_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "secret",
            name: name.into(),
        }
    }

    /// Shorthand for a missing vault path.
    pub fn vault_not_found(path: &std::path::Path) -> Self {
        Self::NotFound {
            kind: "vault",
            name: path.display().to_string(),
        }
    }

    /// Whether the caller can branch on this error and carry on.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
