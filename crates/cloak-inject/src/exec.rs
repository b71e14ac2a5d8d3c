// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Child process execution with a redacting output shim.
//!
//! stdin is always inherited. stdout and stderr are either inherited
//! (`no_mask`) or piped through two independent reader tasks that redact each
//! chunk before forwarding it. There is no timeout: the child runs until it
//! exits.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use cloak_core::CloakError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::env::ChildEnv;
use crate::redact::{Redactor, StreamRedactor};

const CHUNK_SIZE: usize = 8 * 1024;

/// How to run the child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOptions {
    /// Shell program; the command line is passed as `-c <cmd>` (`/C` for cmd).
    pub shell: String,
    /// Inherit stdout/stderr directly. No redaction at all.
    pub no_mask: bool,
    /// Carry a tail across chunks so split values are still redacted.
    pub boundary_safe: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            shell: if cfg!(windows) { "cmd" } else { "sh" }.to_string(),
            no_mask: false,
            boundary_safe: false,
        }
    }
}

fn shell_command(shell: &str, command: &str) -> Command {
    let program = std::path::Path::new(shell)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(shell);
    let flag = if program.eq_ignore_ascii_case("cmd") {
        "/C"
    } else {
        "-c"
    };
    let mut cmd = Command::new(shell);
    cmd.arg(flag).arg(command);
    cmd
}

/// Exit code to report for `status`; signals map to `128 + signal` on unix.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Run `command` with `env`, writing redacted output to the given sinks.
/// Returns the child's exit code.
///
/// The sinks are unused in `no_mask` mode, where the child inherits the real
/// streams.
pub async fn run_command_with_output<O, E>(
    command: &str,
    env: &ChildEnv,
    redactor: Redactor,
    options: &ExecOptions,
    stdout: O,
    stderr: E,
) -> Result<i32, CloakError>
where
    O: AsyncWrite + Unpin + Send + 'static,
    E: AsyncWrite + Unpin + Send + 'static,
{
    let mut cmd = shell_command(&options.shell, command);
    cmd.env_clear().envs(env).stdin(Stdio::inherit());

    if options.no_mask {
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        let mut child = cmd.spawn().map_err(|source| CloakError::ExecFailed {
            command: command.to_string(),
            source,
        })?;
        debug!(pid = child.id(), "child spawned without output masking");
        let status = child.wait().await?;
        let code = exit_code(status);
        debug!(code, "child exited");
        return Ok(code);
    }

    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|source| CloakError::ExecFailed {
        command: command.to_string(),
        source,
    })?;
    debug!(pid = child.id(), "child spawned");

    let redactor = Arc::new(redactor);
    let out_task = child.stdout.take().map(|pipe| {
        tokio::spawn(pump(pipe, stdout, Arc::clone(&redactor), options.boundary_safe))
    });
    let err_task = child.stderr.take().map(|pipe| {
        tokio::spawn(pump(pipe, stderr, Arc::clone(&redactor), options.boundary_safe))
    });

    let status = child.wait().await?;
    for (stream, task) in [("stdout", out_task), ("stderr", err_task)] {
        let Some(task) = task else { continue };
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(stream, error = %e, "failed to forward child output"),
            Err(e) => warn!(stream, error = %e, "output forwarding task failed"),
        }
    }

    let code = exit_code(status);
    debug!(code, "child exited");
    Ok(code)
}

async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    redactor: Arc<Redactor>,
    boundary_safe: bool,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stream = StreamRedactor::new(&redactor, boundary_safe);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let out = stream.push(&buf[..n]);
        if !out.is_empty() {
            writer.write_all(&out).await?;
            writer.flush().await?;
        }
    }
    let tail = stream.finish();
    writer.write_all(&tail).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd_gets_slash_c() {
        let cmd = shell_command("cmd", "echo hi");
        let args: Vec<_> = cmd.as_std().get_args().collect();
        assert_eq!(args, vec!["/C", "echo hi"]);

        let cmd = shell_command("/bin/sh", "echo hi");
        let args: Vec<_> = cmd.as_std().get_args().collect();
        assert_eq!(args, vec!["-c", "echo hi"]);
    }

    #[tokio::test]
    async fn pump_redacts_stream() {
        let redactor = Arc::new(Redactor::new(["hunter2"]));
        let input: &[u8] = b"password=hunter2\n";
        let mut output = Vec::new();
        pump(input, &mut output, redactor, false).await.unwrap();
        assert_eq!(output, b"password=[REDACTED]\n");
    }

    #[cfg(unix)]
    #[test]
    fn signal_maps_to_128_plus() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
    }
}
