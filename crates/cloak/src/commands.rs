// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand implementations.

use std::collections::BTreeSet;
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};

use cloak_config::CloakConfig;
use cloak_core::{CloakError, KeyProvider, KeySource, Scope, VAULT_KEY_ENV_VAR, normalize_tags};
use cloak_inject::{Injector, Selection};
use cloak_vault::paths::{has_live_store, is_locked};
use cloak_vault::{
    UnlockOutcome, Vault, VaultLock, VaultRoots, key_provider_for, lock_password, unlock_password,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

/// The vault a command operates on, plus the configuration around it.
#[derive(Debug)]
pub struct Target {
    config: CloakConfig,
    roots: VaultRoots,
    scope: Scope,
    env: Option<String>,
}

impl Target {
    /// Without an explicit scope, a project that has a local root uses it.
    pub fn new(
        config: CloakConfig,
        scope: Option<Scope>,
        env: Option<String>,
    ) -> Result<Self, CloakError> {
        let roots = VaultRoots::from_config(&config.vault)?;
        Ok(Self::with_roots(config, roots, scope, env))
    }

    fn with_roots(
        config: CloakConfig,
        roots: VaultRoots,
        scope: Option<Scope>,
        env: Option<String>,
    ) -> Self {
        let scope = scope.unwrap_or_else(|| {
            if roots.root(Scope::Local).is_dir() {
                Scope::Local
            } else {
                Scope::Global
            }
        });
        Self {
            config,
            roots,
            scope,
            env,
        }
    }

    fn store_dir(&self) -> Result<PathBuf, CloakError> {
        let dir = self.roots.resolve_store_dir(self.scope, self.env.as_deref())?;
        debug!(scope = %self.scope, dir = %dir.display(), "store directory resolved");
        Ok(dir)
    }

    fn provider(&self, dir: &Path) -> Box<dyn KeyProvider> {
        key_provider_for(&self.config.keychain, dir)
    }

    async fn open(&self) -> Result<Vault, CloakError> {
        let dir = self.store_dir()?;
        Vault::open(&dir, self.provider(&dir)).await
    }

    async fn open_unlocked(&self) -> Result<Vault, CloakError> {
        let mut vault = self.open().await?;
        if !vault.unlock().await {
            return Err(CloakError::NoKeyAvailable(format!(
                "no key for {} in the key provider or {VAULT_KEY_ENV_VAR}",
                vault.path().display()
            )));
        }
        Ok(vault)
    }
}

pub async fn init(target: &Target) -> Result<(), CloakError> {
    let dir = target.store_dir()?;
    let provider = target.provider(&dir);
    let report = Vault::initialize(&dir, provider.as_ref()).await?;
    let custody = if report.generated {
        "new key stored in"
    } else {
        "key from"
    };
    println!(
        "Initialized vault at {} ({custody} {})",
        report.path.display(),
        report.key_source
    );
    Ok(())
}

pub async fn set(
    target: &Target,
    name: &str,
    value: Option<String>,
    tags: &[String],
) -> Result<(), CloakError> {
    let vault = target.open_unlocked().await?;
    let value = match value {
        Some(value) => SecretString::from(value),
        None => read_value(name)?,
    };
    let tags = (!tags.is_empty()).then(|| normalize_tags(tags));
    vault
        .set_secret(name, value.expose_secret(), tags.as_ref())
        .await?;
    vault.close().await?;
    println!("Stored {name}");
    Ok(())
}

/// Secret value from a prompt on a TTY, else all of stdin minus one trailing newline.
fn read_value(name: &str) -> Result<SecretString, CloakError> {
    if std::io::stdin().is_terminal() {
        let value = rpassword::prompt_password(format!("Value for {name}: "))?;
        return Ok(SecretString::from(value));
    }
    let mut value = String::new();
    std::io::stdin().read_to_string(&mut value)?;
    if value.ends_with('\n') {
        value.pop();
        if value.ends_with('\r') {
            value.pop();
        }
    }
    Ok(SecretString::from(value))
}

pub async fn get(target: &Target, name: &str, version: Option<u32>) -> Result<(), CloakError> {
    let vault = target.open_unlocked().await?;
    let value = match version {
        Some(version) => vault
            .get_history_version(name, version)
            .await?
            .ok_or_else(|| version_not_found(name, version))?,
        None => vault
            .get_secret(name)
            .await?
            .ok_or_else(|| CloakError::secret_not_found(name))?,
    };
    vault.close().await?;
    println!("{}", value.expose_secret());
    Ok(())
}

pub async fn list(target: &Target, tags: &[String]) -> Result<(), CloakError> {
    let vault = target.open_unlocked().await?;
    let filter = (!tags.is_empty()).then_some(tags);
    let secrets = vault.list_secrets(filter).await?;
    vault.close().await?;

    if secrets.is_empty() {
        eprintln!("No secrets.");
        return Ok(());
    }
    let width = secrets.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for meta in secrets {
        println!(
            "{:<width$}  {:<25}  {}",
            meta.name,
            meta.updated_at,
            join_tags(&meta.tags)
        );
    }
    Ok(())
}

pub async fn remove(target: &Target, name: &str, purge_history: bool) -> Result<(), CloakError> {
    let vault = target.open_unlocked().await?;
    if !vault.remove_secret(name).await? {
        return Err(CloakError::secret_not_found(name));
    }
    let purged = if purge_history {
        vault.clear_history(name).await?
    } else {
        0
    };
    vault.close().await?;
    if purge_history {
        println!("Removed {name} and {purged} archived version(s)");
    } else {
        println!("Removed {name}");
    }
    Ok(())
}

pub async fn tags_get(target: &Target, name: &str) -> Result<(), CloakError> {
    let vault = target.open_unlocked().await?;
    let tags = vault
        .get_tags(name)
        .await?
        .ok_or_else(|| CloakError::secret_not_found(name))?;
    vault.close().await?;
    println!("{}", join_tags(&tags));
    Ok(())
}

/// How `tags_edit` changes a tag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagEdit {
    Set,
    Add,
    Remove,
}

pub async fn tags_edit(
    target: &Target,
    name: &str,
    edit: TagEdit,
    tags: &[String],
) -> Result<(), CloakError> {
    let vault = target.open_unlocked().await?;
    let found = match edit {
        TagEdit::Set => vault.set_tags(name, tags).await?,
        TagEdit::Add => vault.add_tags(name, tags).await?,
        TagEdit::Remove => vault.remove_tags(name, tags).await?,
    };
    if !found {
        return Err(CloakError::secret_not_found(name));
    }
    let current = vault.get_tags(name).await?.unwrap_or_default();
    vault.close().await?;
    println!("{name}: {}", join_tags(&current));
    Ok(())
}

pub async fn history(target: &Target, name: &str) -> Result<(), CloakError> {
    let vault = target.open_unlocked().await?;
    let entries = vault.get_history(name).await?;
    vault.close().await?;

    if entries.is_empty() {
        eprintln!("No history for {name}.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "v{:<4} {:<25}  {}",
            entry.version,
            entry.archived_at,
            join_tags(&entry.tags)
        );
    }
    Ok(())
}

pub async fn rollback(target: &Target, name: &str, version: u32) -> Result<(), CloakError> {
    let vault = target.open_unlocked().await?;
    if !vault.rollback(name, version).await? {
        return Err(version_not_found(name, version));
    }
    vault.close().await?;
    println!("Rolled {name} back to v{version}");
    Ok(())
}

pub async fn clear_history(target: &Target, name: &str) -> Result<(), CloakError> {
    let vault = target.open_unlocked().await?;
    let removed = vault.clear_history(name).await?;
    vault.close().await?;
    println!("Cleared {removed} archived version(s) of {name}");
    Ok(())
}

pub async fn lock(target: &Target) -> Result<(), CloakError> {
    let dir = target.store_dir()?;
    if is_locked(&dir) {
        return Err(CloakError::AlreadyLocked { path: dir });
    }
    if !has_live_store(&dir) {
        return Err(CloakError::vault_not_found(&dir));
    }
    let password = lock_password()?;
    let report = VaultLock::new(&dir, target.provider(&dir))
        .lock(&password)
        .await?;
    println!("Locked vault into {}", report.path.display());
    if report.key_source == KeySource::Provider && !report.provider_cleared {
        eprintln!("warning: the key provider entry could not be removed");
    }
    Ok(())
}

pub async fn unlock(target: &Target) -> Result<(), CloakError> {
    let dir = target.store_dir()?;
    if !is_locked(&dir) {
        if has_live_store(&dir) {
            println!("Vault at {} is not locked", dir.display());
            return Ok(());
        }
        return Err(CloakError::vault_not_found(&dir));
    }
    let password = unlock_password()?;
    let outcome = VaultLock::new(&dir, target.provider(&dir))
        .unlock(&password)
        .await?;
    match outcome {
        UnlockOutcome::AlreadyUnlocked => println!("Vault at {} is not locked", dir.display()),
        UnlockOutcome::Unlocked { key_restored: true } => {
            println!("Unlocked vault at {}", dir.display())
        }
        UnlockOutcome::Unlocked {
            key_restored: false,
        } => println!(
            "Unlocked vault at {} \
             (key provider unavailable; {VAULT_KEY_ENV_VAR} must supply the key)",
            dir.display()
        ),
    }
    Ok(())
}

pub fn envs(target: &Target) -> Result<(), CloakError> {
    let found = target.roots.list_environments(target.scope)?;
    if found.is_empty() {
        eprintln!(
            "No vaults under {}.",
            target.roots.root(target.scope).display()
        );
        return Ok(());
    }
    for env in found {
        let name = env.name.as_deref().unwrap_or("(legacy)");
        let state = if env.locked { "locked" } else { "open" };
        println!("{name:<16} {state:<7} {}", env.path.display());
    }
    Ok(())
}

pub async fn status(target: &Target) -> Result<(), CloakError> {
    let dir = target.store_dir()?;
    println!("scope:    {}", target.scope);
    if is_locked(&dir) {
        println!("vault:    {} (locked at rest)", dir.display());
        return Ok(());
    }

    let mut vault = target.open().await?;
    vault.unlock().await;
    let status = vault.status().await?;
    vault.close().await?;

    println!("vault:    {}", status.path.display());
    println!("secrets:  {}", status.secrets);
    println!("history:  {}", status.history_entries);
    println!("provider: {}", status.provider);
    match status.key_source {
        Some(source) => println!("key:      {source}"),
        None => println!("key:      unavailable"),
    }
    Ok(())
}

/// Returns the child's exit code.
pub async fn run(
    target: &Target,
    names: Vec<String>,
    tags: Vec<String>,
    no_mask: bool,
    command: &str,
) -> Result<i32, CloakError> {
    let vault = target.open_unlocked().await?;
    let selection = if tags.is_empty() {
        Selection::Names(names)
    } else {
        Selection::Tags(tags)
    };
    let injector = Injector::from_config(&target.config.inject, no_mask);
    let code = injector.run(&vault, &selection, command).await;
    vault.close().await?;
    code
}

fn version_not_found(name: &str, version: u32) -> CloakError {
    CloakError::NotFound {
        kind: "history version",
        name: format!("{name} v{version}"),
    }
}

fn join_tags(tags: &BTreeSet<String>) -> String {
    tags.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}
