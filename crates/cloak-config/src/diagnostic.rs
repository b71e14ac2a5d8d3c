// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics: figment errors and validation failures as
//! miette reports, with typo suggestions for keys and enum values.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::Diagnostic;
use thiserror::Error;

/// Minimum Jaro-Winkler similarity for a "did you mean" hint.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// One configuration problem.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum ConfigError {
    /// A key that no section of `cloak.toml` defines.
    #[error("unknown key `{key}` in {}", section_label(.section))]
    #[diagnostic(
        code(cloak::config::unknown_key),
        help("{}", hint(suggestion.as_deref(), expected))
    )]
    UnknownKey {
        section: String,
        key: String,
        suggestion: Option<String>,
        expected: String,
    },

    /// A value of the wrong type, or an enum value outside the allowed set.
    #[error("invalid value for `{key}`: {detail}")]
    #[diagnostic(
        code(cloak::config::invalid_value),
        help("{}", hint(suggestion.as_deref(), expected))
    )]
    InvalidValue {
        key: String,
        detail: String,
        suggestion: Option<String>,
        expected: String,
    },

    /// A value that parsed but breaks a rule (unknown log level, absolute local dir, ...).
    #[error("`{key}` {message}")]
    #[diagnostic(code(cloak::config::invalid))]
    Invalid { key: &'static str, message: String },

    /// Anything figment reports that has no better shape (unreadable file, bad TOML).
    #[error("{0}")]
    #[diagnostic(code(cloak::config::load))]
    Load(String),
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }

    /// The dotted key this error is about, when there is one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::UnknownKey { key, .. } | Self::InvalidValue { key, .. } => Some(key.as_str()),
            Self::Invalid { key, .. } => Some(*key),
            Self::Load(_) => None,
        }
    }
}

fn section_label(section: &str) -> String {
    if section.is_empty() {
        "the top level".to_string()
    } else {
        format!("[{section}]")
    }
}

fn hint(suggestion: Option<&str>, expected: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? expected one of: {expected}"),
        None if expected.is_empty() => "check the value's type".to_string(),
        None => format!("expected one of: {expected}"),
    }
}

/// Map every error figment collected to a [`ConfigError`].
pub fn figment_to_config_errors(err: figment::Error) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let path = error.path.join(".");
            match &error.kind {
                Kind::UnknownField(field, expected) => ConfigError::UnknownKey {
                    section: path,
                    key: field.clone(),
                    suggestion: closest_match(field, expected).map(str::to_string),
                    expected: expected.join(", "),
                },
                Kind::UnknownVariant(value, expected) => ConfigError::InvalidValue {
                    key: path,
                    detail: format!("`{value}` is not recognized"),
                    suggestion: closest_match(value, expected).map(str::to_string),
                    expected: expected.join(", "),
                },
                Kind::InvalidType(actual, expected) => ConfigError::InvalidValue {
                    key: path,
                    detail: format!("found {actual}, expected {expected}"),
                    suggestion: None,
                    expected: String::new(),
                },
                _ => ConfigError::Load(error.to_string()),
            }
        })
        .collect()
}

/// The candidate most similar to `input`, if any is similar enough.
pub fn closest_match<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&candidate| (candidate, strsim::jaro_winkler(input, candidate)))
        .filter(|(_, score)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate)
}

/// Print every error to stderr as a miette report.
pub fn render_errors(errors: &[ConfigError]) {
    for error in errors {
        eprintln!("{:?}", miette::Report::new(error.clone()));
    }
    if errors.len() > 1 {
        eprintln!("cloak: {} configuration errors", errors.len());
    }
}
