// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for Cloak.
//!
//! TOML configuration with strict `deny_unknown_fields` parsing, a user/local
//! file hierarchy, `CLOAK_*` environment overrides, and miette diagnostics.
//!
//! ```no_run
//! let config = cloak_config::load_and_validate().expect("config errors");
//! println!("log level: {}", config.log.level);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{CloakConfig, InjectConfig, KeychainBackend, KeychainConfig, LogConfig, VaultConfig};

/// Load configuration from the file hierarchy and validate it.
pub fn load_and_validate() -> Result<CloakConfig, Vec<ConfigError>> {
    finish(loader::load_config())
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<CloakConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content))
}

/// Load configuration from an explicit file (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &std::path::Path) -> Result<CloakConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path))
}

#[allow(clippy::result_large_err)]
fn finish(loaded: Result<CloakConfig, figment::Error>) -> Result<CloakConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err)),
    }
}
