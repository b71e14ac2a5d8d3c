// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that run after the configuration has been extracted.

use std::path::Path;

use crate::diagnostic::ConfigError;
use crate::model::CloakConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Check every rule and report all violations together.
pub fn validate_config(config: &CloakConfig) -> Result<(), Vec<ConfigError>> {
    let errors: Vec<ConfigError> = [
        check_log_level(&config.log.level),
        check_local_dir(&config.vault.local_dir),
        non_blank_if_set("vault.global_dir", config.vault.global_dir.as_deref()),
        non_blank_if_set("keychain.service", Some(&config.keychain.service)),
        non_blank_if_set("inject.shell", config.inject.shell.as_deref()),
    ]
    .into_iter()
    .flatten()
    .collect();

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn check_log_level(level: &str) -> Option<ConfigError> {
    (!LOG_LEVELS.contains(&level)).then(|| {
        ConfigError::invalid(
            "log.level",
            format!("is `{level}`, expected one of {}", LOG_LEVELS.join(", ")),
        )
    })
}

fn check_local_dir(dir: &str) -> Option<ConfigError> {
    let dir = dir.trim();
    if dir.is_empty() {
        Some(ConfigError::invalid("vault.local_dir", "must not be empty"))
    } else if Path::new(dir).is_absolute() {
        Some(ConfigError::invalid(
            "vault.local_dir",
            format!("is `{dir}` but must be relative to the working directory"),
        ))
    } else {
        None
    }
}

fn non_blank_if_set(key: &'static str, value: Option<&str>) -> Option<ConfigError> {
    value
        .filter(|v| v.trim().is_empty())
        .map(|_| ConfigError::invalid(key, "must not be blank"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(errors: &[ConfigError]) -> Vec<&str> {
        errors.iter().filter_map(ConfigError::key).collect()
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&CloakConfig::default()).is_ok());
    }

    #[test]
    fn unknown_log_level_fails() {
        let mut config = CloakConfig::default();
        config.log.level = "loud".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(keys(&errors), vec!["log.level"]);
    }

    #[test]
    fn errors_are_collected_not_fail_fast() {
        let mut config = CloakConfig::default();
        config.vault.local_dir = "".into();
        config.keychain.service = " ".into();
        config.inject.shell = Some("".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            keys(&errors),
            vec!["vault.local_dir", "keychain.service", "inject.shell"]
        );
    }

    #[test]
    fn absolute_local_dir_fails() {
        let mut config = CloakConfig::default();
        config.vault.local_dir = if cfg!(windows) { "C:\\cloak" } else { "/cloak" }.into();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("relative"));
    }
}
