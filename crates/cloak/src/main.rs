// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cloak - a local secrets vault.
//!
//! This is the binary entry point. Diagnostics go to stderr so that the
//! stdout of `cloak get` and of injected commands stays clean.

mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use cloak_core::{CloakError, Scope};

use crate::commands::Target;

/// Cloak - keep credentials out of shell history, dotfiles and logs.
#[derive(Parser, Debug)]
#[command(name = "cloak", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    target: TargetArgs,

    /// Read configuration from this file instead of the default hierarchy.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Which vault a command operates on.
#[derive(Args, Debug, Default)]
struct TargetArgs {
    /// Use the vault under the home directory.
    #[arg(short, long, global = true, conflicts_with = "local")]
    global: bool,

    /// Use the vault under the current project directory.
    #[arg(short, long, global = true)]
    local: bool,

    /// Named environment within the scope.
    #[arg(short, long, global = true, value_name = "NAME")]
    env: Option<String>,
}

impl TargetArgs {
    fn scope(&self) -> Option<Scope> {
        match (self.global, self.local) {
            (true, _) => Some(Scope::Global),
            (_, true) => Some(Scope::Local),
            _ => None,
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a vault and provision its key.
    Init,
    /// Store a secret. Reads the value from stdin when not given.
    Set {
        name: String,
        value: Option<String>,
        /// Replace the secret's tags (repeatable).
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// Print a secret's value.
    Get {
        name: String,
        /// Print an archived version instead of the current value.
        #[arg(long, value_name = "N")]
        version: Option<u32>,
    },
    /// List secret names and tags.
    List {
        /// Only secrets carrying any of these tags (repeatable).
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// Delete a secret's current value.
    Rm {
        name: String,
        /// Also delete its archived versions.
        #[arg(long)]
        purge_history: bool,
    },
    /// Inspect or edit a secret's tags.
    Tags {
        #[command(subcommand)]
        action: TagsAction,
    },
    /// List archived versions of a secret.
    History { name: String },
    /// Make an archived version current again.
    Rollback { name: String, version: u32 },
    /// Delete every archived version of a secret.
    ClearHistory { name: String },
    /// Encrypt the vault at rest under a password.
    Lock,
    /// Restore a vault locked at rest.
    Unlock,
    /// List the vaults in the selected scope.
    Envs,
    /// Show vault location, counts and key custody.
    Status,
    /// Run a command with secrets injected and its output redacted.
    Run {
        /// Secret names to inject. Missing names fall back to the environment.
        #[arg(conflicts_with = "tags")]
        names: Vec<String>,
        /// Inject every secret carrying any of these tags (repeatable).
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Pass output through without redaction.
        #[arg(long)]
        no_mask: bool,
        /// Command line, run through the configured shell.
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

/// Tag subcommands.
#[derive(Subcommand, Debug)]
enum TagsAction {
    /// Print a secret's tags.
    Get { name: String },
    /// Replace a secret's tags.
    Set { name: String, tags: Vec<String> },
    /// Add tags to a secret.
    Add {
        name: String,
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Remove tags from a secret.
    Remove {
        name: String,
        #[arg(required = true)]
        tags: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match cli.config.as_deref() {
        Some(path) => cloak_config::load_and_validate_path(path),
        None => cloak_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            cloak_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.log.level);

    let code = match run(cli, config).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("cloak: {err}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli, config: cloak_config::CloakConfig) -> Result<i32, CloakError> {
    let target = Target::new(config, cli.target.scope(), cli.target.env)?;

    match cli.command {
        Commands::Init => commands::init(&target).await?,
        Commands::Set { name, value, tags } => commands::set(&target, &name, value, &tags).await?,
        Commands::Get { name, version } => commands::get(&target, &name, version).await?,
        Commands::List { tags } => commands::list(&target, &tags).await?,
        Commands::Rm {
            name,
            purge_history,
        } => commands::remove(&target, &name, purge_history).await?,
        Commands::Tags { action } => match action {
            TagsAction::Get { name } => commands::tags_get(&target, &name).await?,
            TagsAction::Set { name, tags } => {
                commands::tags_edit(&target, &name, commands::TagEdit::Set, &tags).await?
            }
            TagsAction::Add { name, tags } => {
                commands::tags_edit(&target, &name, commands::TagEdit::Add, &tags).await?
            }
            TagsAction::Remove { name, tags } => {
                commands::tags_edit(&target, &name, commands::TagEdit::Remove, &tags).await?
            }
        },
        Commands::History { name } => commands::history(&target, &name).await?,
        Commands::Rollback { name, version } => commands::rollback(&target, &name, version).await?,
        Commands::ClearHistory { name } => commands::clear_history(&target, &name).await?,
        Commands::Lock => commands::lock(&target).await?,
        Commands::Unlock => commands::unlock(&target).await?,
        Commands::Envs => commands::envs(&target)?,
        Commands::Status => commands::status(&target).await?,
        Commands::Run {
            names,
            tags,
            no_mask,
            command,
        } => return commands::run(&target, names, tags, no_mask, &command.join(" ")).await,
    }
    Ok(0)
}

/// Process exit code for a failed command.
fn exit_code_for(err: &CloakError) -> i32 {
    match err {
        CloakError::AuthFailed(_) | CloakError::NoKeyAvailable(_) => 2,
        CloakError::ExecFailed { .. } => 127,
        _ => 1,
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cloak={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_takes_names_and_trailing_command() {
        let cli = Cli::try_parse_from(["cloak", "run", "A", "B", "--", "echo", "$A"]).unwrap();
        match cli.command {
            Commands::Run {
                names,
                tags,
                command,
                no_mask,
            } => {
                assert_eq!(names, vec!["A", "B"]);
                assert!(tags.is_empty());
                assert!(!no_mask);
                assert_eq!(command.join(" "), "echo $A");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn run_rejects_names_with_tags() {
        let err = Cli::try_parse_from(["cloak", "run", "A", "--tag", "db", "--", "env"]);
        assert!(err.is_err());
    }

    #[test]
    fn run_requires_a_command() {
        assert!(Cli::try_parse_from(["cloak", "run", "A"]).is_err());
    }

    #[test]
    fn scope_flags_are_global_and_exclusive() {
        let cli = Cli::try_parse_from(["cloak", "list", "--global", "--env", "staging"]).unwrap();
        assert_eq!(cli.target.scope(), Some(Scope::Global));
        assert_eq!(cli.target.env.as_deref(), Some("staging"));

        let cli = Cli::try_parse_from(["cloak", "-l", "status"]).unwrap();
        assert_eq!(cli.target.scope(), Some(Scope::Local));

        assert!(Cli::try_parse_from(["cloak", "-g", "-l", "status"]).is_err());
        assert_eq!(
            Cli::try_parse_from(["cloak", "status"]).unwrap().target.scope(),
            None
        );
    }

    #[test]
    fn set_collects_repeated_tags() {
        let cli =
            Cli::try_parse_from(["cloak", "set", "API_KEY", "--tag", "web", "-t", "prod"]).unwrap();
        match cli.command {
            Commands::Set { name, value, tags } => {
                assert_eq!(name, "API_KEY");
                assert!(value.is_none());
                assert_eq!(tags, vec!["web", "prod"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(exit_code_for(&CloakError::AuthFailed("x".into())), 2);
        assert_eq!(exit_code_for(&CloakError::NoKeyAvailable("x".into())), 2);
        assert_eq!(
            exit_code_for(&CloakError::MissingSecrets {
                names: vec!["A".into()]
            }),
            1
        );
        assert_eq!(
            exit_code_for(&CloakError::ExecFailed {
                command: "x".into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
            127
        );
        assert_eq!(exit_code_for(&CloakError::Config("x".into())), 1);
    }
}
