// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Override variable lookup and travel-password acquisition.

use std::io::IsTerminal;

use cloak_core::{CloakError, VAULT_KEY_ENV_VAR};
use secrecy::SecretString;
use zeroize::Zeroizing;

/// The `CLOAK_VAULT_KEY` value, if set and non-empty.
///
/// Depending on the caller this is either the direct vault key material or
/// the lock/unlock password; the variable itself does not say which.
pub fn env_override() -> Option<SecretString> {
    match std::env::var(VAULT_KEY_ENV_VAR) {
        Ok(value) if !value.is_empty() => Some(SecretString::from(value)),
        _ => None,
    }
}

/// Password for `unlock`: `CLOAK_VAULT_KEY` first, then a TTY prompt.
pub fn unlock_password() -> Result<SecretString, CloakError> {
    if let Some(password) = env_override() {
        return Ok(password);
    }

    if std::io::stdin().is_terminal() {
        let password = read("Vault password: ")?;
        if password.is_empty() {
            return Err(CloakError::AuthFailed("empty password not allowed".to_string()));
        }
        return Ok(SecretString::from(password.to_string()));
    }

    Err(no_password())
}

/// Password for `lock`, prompted twice. The override variable needs no confirmation.
pub fn lock_password() -> Result<SecretString, CloakError> {
    if let Some(password) = env_override() {
        return Ok(password);
    }

    if std::io::stdin().is_terminal() {
        let first = read("New vault password: ")?;
        let second = read("Confirm vault password: ")?;
        if *first != *second {
            return Err(CloakError::AuthFailed("passwords do not match".to_string()));
        }
        if first.is_empty() {
            return Err(CloakError::AuthFailed("empty password not allowed".to_string()));
        }
        return Ok(SecretString::from(first.to_string()));
    }

    Err(no_password())
}

fn read(prompt: &str) -> Result<Zeroizing<String>, CloakError> {
    rpassword::prompt_password(prompt)
        .map(Zeroizing::new)
        .map_err(|e| CloakError::Internal(format!("failed to read password: {e}")))
}

fn no_password() -> CloakError {
    CloakError::AuthFailed(format!(
        "no password provided -- set {VAULT_KEY_ENV_VAR} or run interactively"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    #[test]
    #[serial]
    fn override_reads_env_var() {
        // SAFETY: test-only env mutation, serialized with other env tests.
        unsafe { std::env::set_var(VAULT_KEY_ENV_VAR, "travel-pass") };
        let result = unlock_password();
        let confirmed = lock_password();
        unsafe { std::env::remove_var(VAULT_KEY_ENV_VAR) };

        assert_eq!(result.unwrap().expose_secret(), "travel-pass");
        assert_eq!(confirmed.unwrap().expose_secret(), "travel-pass");
    }

    #[test]
    #[serial]
    fn empty_override_is_ignored() {
        unsafe { std::env::set_var(VAULT_KEY_ENV_VAR, "") };
        let value = env_override();
        unsafe { std::env::remove_var(VAULT_KEY_ENV_VAR) };

        assert!(value.is_none());
    }
}
