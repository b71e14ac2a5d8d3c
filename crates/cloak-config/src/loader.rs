// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! `./cloak.toml` > `~/.config/cloak/cloak.toml` > compiled defaults, with
//! environment variable overrides via the `CLOAK_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::CloakConfig;

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `~/.config/cloak/cloak.toml` (user config)
/// 3. `./cloak.toml` (local directory)
/// 4. `CLOAK_*` environment variables
pub fn load_config() -> Result<CloakConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<CloakConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CloakConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CloakConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CloakConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(CloakConfig::default()))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("cloak/cloak.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("cloak.toml"))
        .merge(env_provider())
}

/// Environment provider with explicit section mapping.
///
/// Uses an explicit prefix map rather than `Env::split("_")` because keys
/// contain underscores: `CLOAK_INJECT_BOUNDARY_SAFE_REDACTION` must map to
/// `inject.boundary_safe_redaction`. `CLOAK_VAULT_KEY` is the key/password
/// override and never reaches the config model.
fn env_provider() -> Env {
    Env::prefixed("CLOAK_").filter_map(|key| {
        let key_str = key.as_str().to_ascii_lowercase();
        if key_str == "vault_key" {
            return None;
        }
        let mapped = key_str
            .replacen("log_", "log.", 1)
            .replacen("vault_", "vault.", 1)
            .replacen("keychain_", "keychain.", 1)
            .replacen("inject_", "inject.", 1);
        Some(mapped.into())
    })
}
