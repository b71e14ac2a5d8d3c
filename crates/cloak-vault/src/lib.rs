// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted secret vault for Cloak.
//!
//! Secrets are encrypted one by one with AES-256-GCM under a 32-byte vault
//! key held by a [`KeyProvider`](cloak_core::KeyProvider). Each store is a
//! SQLite file in its own directory, addressed by scope and environment.
//! [`VaultLock`] turns a whole store into a password-encrypted artifact for
//! travel or backup.

pub mod cipher;
pub mod keychain;
pub mod lock;
pub mod paths;
pub mod prompt;
pub mod store;
pub mod vault;

pub use keychain::{
    LinuxSecretService, MacosKeychain, MemoryKeyProvider, UnavailableKeyProvider,
    WindowsCredentialStore, key_provider_for,
};
pub use lock::{LockReport, UnlockOutcome, VaultLock};
pub use paths::{EnvironmentSummary, VaultRoots};
pub use prompt::{lock_password, unlock_password};
pub use vault::{InitReport, Vault, VaultStatus};
