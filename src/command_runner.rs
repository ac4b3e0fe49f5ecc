//! External command execution.
//!
//! Every tool invocation goes through a `CommandRunner`. `SystemRunner` is the
//! production implementation:
//!
//! - Spawns the tool in a new process group via `.in_new_process_group()`
//! - Registers the child PID with `ChildRegistry::global()` while it runs
//! - Skips destructive tools under `--dry-run` and reports a synthetic success
//!
//! Pipelines take `&dyn CommandRunner`, so tests can substitute a scripted
//! runner and never touch the host.

use std::process::{Command, Stdio};

use crate::error::{AdminError, Result};
use crate::process_guard::{ChildGuard, CommandProcessGroup};
use crate::tools::ToolCommand;
use crate::tools::system::Which;

/// Output from an external command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    pub success: bool,
    /// True when the command was skipped by `--dry-run`.
    pub dry_run: bool,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code: Some(0),
            success: true,
            ..Self::default()
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code: Some(exit_code),
            success: false,
            ..Self::default()
        }
    }

    /// One-line description of a failure: exit code plus trimmed stderr.
    pub fn failure_summary(&self) -> String {
        let code = match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "killed by signal".to_string(),
        };
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            code
        } else {
            format!("{code}: {stderr}")
        }
    }
}

/// Executes typed tool commands.
pub trait CommandRunner {
    /// Run the command to completion. A non-zero exit is NOT an error here;
    /// inspect `CommandOutput::success`. Errors mean the tool could not run.
    fn run(&self, command: &dyn ToolCommand) -> Result<CommandOutput>;

    /// Whether `binary` is on `PATH`.
    fn binary_exists(&self, binary: &str) -> bool {
        self.run(&Which::new(binary))
            .map(|output| output.success)
            .unwrap_or(false)
    }

    /// Whether destructive commands and file writes are being skipped.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Runs commands on the local host.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    dry_run: bool,
}

impl SystemRunner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, command: &dyn ToolCommand) -> Result<CommandOutput> {
        let line = command.command_line();

        if self.dry_run && command.is_destructive() {
            tracing::info!("[DRY RUN] Skipped: {line}");
            return Ok(CommandOutput {
                stdout: format!("[DRY RUN] Skipped: {line}\n"),
                exit_code: Some(0),
                success: true,
                dry_run: true,
                ..CommandOutput::default()
            });
        }

        tracing::debug!("Running: {line}");

        let mut cmd = Command::new(command.program());
        cmd.args(command.to_cli_args())
            .envs(command.get_env_vars())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group();
        if let Some(dir) = command.working_dir() {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .map_err(|e| AdminError::command(format!("failed to spawn '{line}': {e}")))?;
        let _guard = ChildGuard::register(child.id());

        let output = child
            .wait_with_output()
            .map_err(|e| AdminError::command(format!("failed waiting for '{line}': {e}")))?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            success: output.status.success(),
            dry_run: false,
        };

        if result.success {
            tracing::debug!("{} succeeded", command.program());
        } else {
            tracing::debug!("{} failed: {}", command.program(), result.failure_summary());
        }
        Ok(result)
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}
