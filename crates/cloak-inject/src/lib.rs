// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret injection for Cloak.
//!
//! Resolves a [`Selection`] from a vault, builds the child environment, and
//! runs the command with its output redacted. Named-mode gaps abort before
//! anything is spawned.

pub mod env;
pub mod exec;
pub mod redact;
pub mod resolve;

use cloak_config::InjectConfig;
use cloak_core::CloakError;
use cloak_vault::Vault;
use secrecy::ExposeSecret;
use tokio::io::AsyncWrite;
use tracing::info;

pub use env::{ChildEnv, build_child_env, child_env_from_process};
pub use exec::{ExecOptions, exit_code, run_command_with_output};
pub use redact::{Redactor, StreamRedactor};
pub use resolve::{Resolution, Selection, resolve, resolve_with};

/// Resolve, then execute with redaction.
#[derive(Debug, Clone, Default)]
pub struct Injector {
    options: ExecOptions,
}

impl Injector {
    pub fn new(options: ExecOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &InjectConfig, no_mask: bool) -> Self {
        Self::new(ExecOptions {
            shell: config.shell_program(),
            no_mask,
            boundary_safe: config.boundary_safe_redaction,
        })
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    /// Run `command` with the selected secrets, output to this process's stdio.
    pub async fn run(
        &self,
        vault: &Vault,
        selection: &Selection,
        command: &str,
    ) -> Result<i32, CloakError> {
        self.run_with_output(vault, selection, command, tokio::io::stdout(), tokio::io::stderr())
            .await
    }

    /// [`Injector::run`] with explicit output sinks.
    pub async fn run_with_output<O, E>(
        &self,
        vault: &Vault,
        selection: &Selection,
        command: &str,
        stdout: O,
        stderr: E,
    ) -> Result<i32, CloakError>
    where
        O: AsyncWrite + Unpin + Send + 'static,
        E: AsyncWrite + Unpin + Send + 'static,
    {
        let secrets = resolve(vault, selection).await?.into_result()?;
        let redactor = Redactor::new(secrets.values().map(|v| v.expose_secret().as_bytes()));
        let env = child_env_from_process(&secrets);
        let injected = secrets.len();
        drop(secrets);

        info!(
            injected,
            no_mask = self.options.no_mask,
            "running command with injected secrets"
        );
        run_command_with_output(command, &env, redactor, &self.options, stdout, stderr).await
    }
}
