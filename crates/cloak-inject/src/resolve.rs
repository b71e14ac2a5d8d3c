// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn a secret selection into name/value pairs.

use std::collections::BTreeMap;

use cloak_core::CloakError;
use cloak_vault::Vault;
use secrecy::SecretString;
use tracing::{debug, warn};

/// Which secrets to inject. The two modes are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Explicit names; names missing from the vault fall back to the process environment.
    Names(Vec<String>),
    /// Every secret carrying any of these tags. No environment fallback.
    Tags(Vec<String>),
}

/// Result of resolving a [`Selection`].
#[derive(Debug, Default)]
pub struct Resolution {
    pub resolved: BTreeMap<String, SecretString>,
    /// Requested names found neither in the vault nor the environment.
    pub missing: Vec<String>,
}

impl Resolution {
    /// The resolved values, or `MissingSecrets` naming every gap.
    pub fn into_result(self) -> Result<BTreeMap<String, SecretString>, CloakError> {
        if self.missing.is_empty() {
            Ok(self.resolved)
        } else {
            Err(CloakError::MissingSecrets {
                names: self.missing,
            })
        }
    }
}

/// Resolve against `vault`, using the process environment for name fallback.
pub async fn resolve(vault: &Vault, selection: &Selection) -> Result<Resolution, CloakError> {
    resolve_with(vault, selection, |name| std::env::var(name).ok()).await
}

/// Resolve with an explicit environment lookup.
pub async fn resolve_with<F>(
    vault: &Vault,
    selection: &Selection,
    lookup: F,
) -> Result<Resolution, CloakError>
where
    F: Fn(&str) -> Option<String>,
{
    match selection {
        Selection::Names(names) => {
            let mut resolved = vault.get_secrets(names.as_slice()).await?;
            let mut missing = Vec::new();
            let mut from_env = 0usize;
            for name in names {
                if resolved.contains_key(name) {
                    continue;
                }
                match lookup(name) {
                    Some(value) => {
                        resolved.insert(name.clone(), SecretString::from(value));
                        from_env += 1;
                    }
                    None if !missing.contains(name) => missing.push(name.clone()),
                    None => {}
                }
            }
            debug!(
                requested = names.len(),
                resolved = resolved.len(),
                from_env,
                missing = missing.len(),
                "resolved secrets by name"
            );
            Ok(Resolution { resolved, missing })
        }
        Selection::Tags(tags) => {
            let names: Vec<String> = vault
                .list_secrets(Some(tags.as_slice()))
                .await?
                .into_iter()
                .map(|meta| meta.name)
                .collect();
            if names.is_empty() {
                warn!(tags = %tags.join(","), "no secrets match the tag filter");
            }
            let resolved = vault.get_secrets(names.as_slice()).await?;
            debug!(resolved = resolved.len(), "resolved secrets by tag");
            Ok(Resolution {
                resolved,
                missing: Vec::new(),
            })
        }
    }
}
