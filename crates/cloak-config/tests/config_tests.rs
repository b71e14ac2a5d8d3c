// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Cloak configuration system.

use cloak_config::diagnostic::ConfigError;
use cloak_config::{KeychainBackend, load_and_validate_str, load_config_from_str};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_cloak_config() {
    let toml = r#"
[log]
level = "debug"

[vault]
global_dir = "/srv/cloak"
local_dir = ".vault"

[keychain]
backend = "linux"
service = "cloak-ci"

[inject]
shell = "bash"
boundary_safe_redaction = true
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.vault.global_dir.as_deref(), Some("/srv/cloak"));
    assert_eq!(config.vault.local_dir, ".vault");
    assert_eq!(config.keychain.backend, KeychainBackend::Linux);
    assert_eq!(config.keychain.service, "cloak-ci");
    assert_eq!(config.inject.shell.as_deref(), Some("bash"));
    assert!(config.inject.boundary_safe_redaction);
}

/// Empty TOML yields defaults everywhere.
#[test]
fn empty_toml_uses_defaults() {
    let config = load_and_validate_str("").expect("defaults are valid");
    assert_eq!(config.log.level, "warn");
    assert_eq!(config.keychain.backend, KeychainBackend::Auto);
}

/// A typo in a section key becomes an UnknownKey diagnostic with a suggestion.
#[test]
fn unknown_key_suggests_correction() {
    let toml = r#"
[keychain]
servce = "cloak"
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    assert!(errors.iter().any(|e| matches!(
        e,
        ConfigError::UnknownKey { key, suggestion: Some(s), .. }
            if key == "servce" && s == "service"
    )));
}

/// A wrong value type is reported as InvalidValue.
#[test]
fn wrong_type_is_reported() {
    let toml = r#"
[inject]
boundary_safe_redaction = "yes please"
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::InvalidValue { .. })));
}

/// An unknown backend name is rejected at parse time, with a suggestion when close.
#[test]
fn unknown_backend_is_rejected() {
    let toml = r#"
[keychain]
backend = "floppy"
"#;
    assert!(load_and_validate_str(toml).is_err());

    let toml = r#"
[keychain]
backend = "linx"
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    assert!(errors.iter().any(|e| matches!(
        e,
        ConfigError::InvalidValue { suggestion: Some(s), .. } if s == "linux"
    )));
}

/// Semantic validation runs after parsing.
#[test]
fn semantic_validation_runs_after_parse() {
    let toml = r#"
[log]
level = "chatty"
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::Invalid { key: "log.level", .. })));
}
