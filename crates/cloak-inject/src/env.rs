// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Child process environment construction.

use std::collections::BTreeMap;
use std::ffi::OsString;

use cloak_core::VAULT_KEY_ENV_VAR;
use secrecy::{ExposeSecret, SecretString};

/// Full environment for a child process.
pub type ChildEnv = BTreeMap<OsString, OsString>;

/// Ambient variables, overlaid with `secrets`, minus `CLOAK_VAULT_KEY`.
///
/// The override variable is removed even if a secret of that name was
/// resolved, so a child can never read the vault's bootstrap key.
pub fn build_child_env<I, K, V>(ambient: I, secrets: &BTreeMap<String, SecretString>) -> ChildEnv
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<OsString>,
    V: Into<OsString>,
{
    let mut env: ChildEnv = ambient
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    for (name, value) in secrets {
        env.insert(name.into(), value.expose_secret().into());
    }
    env.remove(&OsString::from(VAULT_KEY_ENV_VAR));
    env
}

/// [`build_child_env`] over the current process environment.
pub fn child_env_from_process(secrets: &BTreeMap<String, SecretString>) -> ChildEnv {
    build_child_env(std::env::vars_os(), secrets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets(pairs: &[(&str, &str)]) -> BTreeMap<String, SecretString> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), SecretString::from(v.to_string())))
            .collect()
    }

    #[test]
    fn overlays_secrets_on_ambient() {
        let env = build_child_env(
            [("PATH", "/bin"), ("API_KEY", "stale")],
            &secrets(&[("API_KEY", "fresh"), ("TOKEN", "t")]),
        );
        assert_eq!(env[&OsString::from("PATH")], "/bin");
        assert_eq!(env[&OsString::from("API_KEY")], "fresh");
        assert_eq!(env[&OsString::from("TOKEN")], "t");
    }

    #[test]
    fn strips_override_variable() {
        let env = build_child_env(
            [(VAULT_KEY_ENV_VAR, "bootstrap"), ("HOME", "/root")],
            &BTreeMap::new(),
        );
        assert!(!env.contains_key(&OsString::from(VAULT_KEY_ENV_VAR)));
        assert!(env.contains_key(&OsString::from("HOME")));
    }

    #[test]
    fn strips_override_even_when_resolved_as_secret() {
        let env = build_child_env(
            Vec::<(String, String)>::new(),
            &secrets(&[(VAULT_KEY_ENV_VAR, "sneaky")]),
        );
        assert!(env.is_empty());
    }
}
