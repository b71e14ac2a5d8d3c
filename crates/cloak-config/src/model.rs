// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Cloak.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Top-level Cloak configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CloakConfig {
    /// Log output settings.
    #[serde(default)]
    pub log: LogConfig,

    /// Store location settings.
    #[serde(default)]
    pub vault: VaultConfig,

    /// OS credential store settings.
    #[serde(default)]
    pub keychain: KeychainConfig,

    /// Secret injection settings.
    #[serde(default)]
    pub inject: InjectConfig,
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Store location configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Root of the global scope. `None` means `<home>/.cloak`.
    #[serde(default)]
    pub global_dir: Option<String>,

    /// Directory name of the local scope, relative to the working directory.
    #[serde(default = "default_local_dir")]
    pub local_dir: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            global_dir: None,
            local_dir: default_local_dir(),
        }
    }
}

impl VaultConfig {
    /// Resolved global root, expanding a leading `~/`.
    pub fn global_root(&self) -> PathBuf {
        match self.global_dir.as_deref() {
            Some(dir) => expand_home(dir),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".cloak"),
        }
    }
}

fn default_local_dir() -> String {
    ".cloak".to_string()
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

/// Which credential store backend holds vault keys.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Deserialize, Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum KeychainBackend {
    /// Pick the native store for the host platform.
    #[default]
    Auto,
    Macos,
    Linux,
    Windows,
    /// Process-local map; keys vanish on exit.
    Memory,
    /// No provider; only `CLOAK_VAULT_KEY` can supply a key.
    None,
}

/// OS credential store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeychainConfig {
    #[serde(default)]
    pub backend: KeychainBackend,

    /// Service name entries are filed under.
    #[serde(default = "default_service")]
    pub service: String,
}

impl Default for KeychainConfig {
    fn default() -> Self {
        Self {
            backend: KeychainBackend::default(),
            service: default_service(),
        }
    }
}

fn default_service() -> String {
    "cloak".to_string()
}

/// Secret injection configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InjectConfig {
    /// Shell used to run commands. `None` means `sh` (unix) or `cmd` (windows).
    #[serde(default)]
    pub shell: Option<String>,

    /// Hold back a tail across output chunks so secrets split between two
    /// reads are still redacted. Off by default.
    #[serde(default)]
    pub boundary_safe_redaction: bool,
}

impl InjectConfig {
    /// The shell program to spawn commands through.
    pub fn shell_program(&self) -> String {
        match &self.shell {
            Some(shell) => shell.clone(),
            None if cfg!(windows) => "cmd".to_string(),
            None => "sh".to_string(),
        }
    }
}
