//! Type-safe arguments for the external tools dietpi-admin drives.
//!
//! Each struct maps its fields to the exact argv and environment the tool
//! expects. Nothing is ever passed through a shell, so paths with spaces or
//! quotes in them reach the tool unchanged.
//!
//! # Contract
//!
//! - `program()`: binary name, resolved through `PATH`
//! - `to_cli_args()`: argv after the program name, in order
//! - `get_env_vars()`: extra environment for the child
//! - `working_dir()`: directory the child starts in, if it matters
//! - `is_destructive()`: whether `--dry-run` must skip it

pub mod apt;
pub mod docker;
pub mod mount;
pub mod system;
pub mod wget;
pub mod zip;

use std::path::Path;

/// Trait for typed external command arguments.
pub trait ToolCommand {
    /// Binary to execute (e.g. "apt-get").
    fn program(&self) -> &'static str;

    /// Arguments exactly as the tool should receive them.
    fn to_cli_args(&self) -> Vec<String>;

    /// Environment variables the tool requires.
    fn get_env_vars(&self) -> Vec<(String, String)> {
        vec![]
    }

    /// Working directory for the child process.
    fn working_dir(&self) -> Option<&Path> {
        None
    }

    /// Whether the command changes system state.
    ///
    /// Read-only probes (`which`, `dmesg`, `dpkg-query`) still run under
    /// `--dry-run` so the preview reflects the real host.
    fn is_destructive(&self) -> bool {
        true
    }

    /// Human-readable command line for logs.
    fn command_line(&self) -> String {
        let mut line = self.program().to_string();
        for arg in self.to_cli_args() {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}
