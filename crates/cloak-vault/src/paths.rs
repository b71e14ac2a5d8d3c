// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scope and environment resolution to store directories.
//!
//! Layout under each scope root:
//!
//! ```text
//! <root>/vault.db              legacy unscoped store
//! <root>/envs/<env>/vault.db   named environment
//! ```
//!
//! The filesystem is the only registry; nothing is cached between calls.

use std::path::{Path, PathBuf};

use cloak_config::VaultConfig;
use cloak_core::{CloakError, Scope, validate_env_name};

use crate::store::{LOCKED_FILE, STORE_FILE};

/// Sub-directory holding named environments.
pub const ENVS_DIR: &str = "envs";

/// Environment used when none is named and no legacy store exists.
pub const DEFAULT_ENV: &str = "default";

/// Whether `dir` holds a live store file.
pub fn has_live_store(dir: &Path) -> bool {
    dir.join(STORE_FILE).is_file()
}

/// Whether `dir` holds a locked artifact.
pub fn is_locked(dir: &Path) -> bool {
    dir.join(LOCKED_FILE).is_file()
}

/// Whether `dir` holds a vault in either state.
pub fn has_store(dir: &Path) -> bool {
    has_live_store(dir) || is_locked(dir)
}

/// One store directory found by [`VaultRoots::list_environments`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSummary {
    /// `None` for the legacy unscoped store.
    pub name: Option<String>,
    pub path: PathBuf,
    pub locked: bool,
}

/// The global and local scope roots.
#[derive(Debug, Clone)]
pub struct VaultRoots {
    global: PathBuf,
    local: PathBuf,
}

impl VaultRoots {
    pub fn new(global: impl Into<PathBuf>, local: impl Into<PathBuf>) -> Self {
        Self {
            global: global.into(),
            local: local.into(),
        }
    }

    /// Roots from configuration; the local root hangs off the working directory.
    pub fn from_config(config: &VaultConfig) -> Result<Self, CloakError> {
        let cwd = std::env::current_dir()?;
        Ok(Self::new(config.global_root(), cwd.join(&config.local_dir)))
    }

    pub fn root(&self, scope: Scope) -> &Path {
        match scope {
            Scope::Global => &self.global,
            Scope::Local => &self.local,
        }
    }

    /// Store directory for `(scope, env)`.
    ///
    /// An explicit environment never falls back. Without one, a legacy store
    /// at the root wins over the implicit `default` environment.
    pub fn resolve_store_dir(
        &self,
        scope: Scope,
        env: Option<&str>,
    ) -> Result<PathBuf, CloakError> {
        let root = self.root(scope);
        match env {
            Some(name) => {
                validate_env_name(name)?;
                Ok(root.join(ENVS_DIR).join(name))
            }
            None if has_store(root) => Ok(root.to_path_buf()),
            None => Ok(root.join(ENVS_DIR).join(DEFAULT_ENV)),
        }
    }

    /// Every store directory in `scope`, legacy first, then environments by name.
    pub fn list_environments(&self, scope: Scope) -> Result<Vec<EnvironmentSummary>, CloakError> {
        let root = self.root(scope);
        let mut found = Vec::new();

        if has_store(root) {
            found.push(EnvironmentSummary {
                name: None,
                path: root.to_path_buf(),
                locked: is_locked(root),
            });
        }

        let envs_dir = root.join(ENVS_DIR);
        let entries = match std::fs::read_dir(&envs_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e.into()),
        };

        let mut named = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !path.is_dir() || validate_env_name(&name).is_err() || !has_store(&path) {
                continue;
            }
            named.push(EnvironmentSummary {
                name: Some(name),
                locked: is_locked(&path),
                path,
            });
        }
        named.sort_by(|a, b| a.name.cmp(&b.name));
        found.extend(named);

        Ok(found)
    }
}
