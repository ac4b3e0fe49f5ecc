//! Pre-flight checks for the runtime environment
//!
//! - Root privileges (EUID 0) for commands that touch fstab or dpkg
//! - Required binaries, installed through apt when a package provides them

use crate::command_runner::CommandRunner;
use crate::error::{AdminError, Result};
use crate::tools::apt::AptInstall;

/// Debian package providing a binary, when apt can install it.
pub fn package_for_binary(binary: &str) -> Option<&'static str> {
    match binary {
        "wget" => Some("wget"),
        "zip" => Some("zip"),
        "mount.cifs" => Some("cifs-utils"),
        "dmesg" => Some("util-linux"),
        _ => None,
    }
}

/// Check if running as root (EUID 0)
pub fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Set DIETPI_ADMIN_SKIP_ROOT_CHECK=1 to skip (development only)
pub fn should_skip_root_check() -> bool {
    std::env::var("DIETPI_ADMIN_SKIP_ROOT_CHECK")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Fail unless running as root or the skip flag is set.
pub fn require_root(action: &str) -> Result<()> {
    if is_running_as_root() {
        return Ok(());
    }
    if should_skip_root_check() {
        tracing::warn!("Root check skipped (DIETPI_ADMIN_SKIP_ROOT_CHECK=1)");
        return Ok(());
    }
    Err(AdminError::validation(format!(
        "{action} requires root privileges; run with sudo"
    )))
}

/// Fail with `DependencyMissing` when `binary` is not on PATH.
pub fn require_binary(runner: &dyn CommandRunner, binary: &str) -> Result<()> {
    if runner.binary_exists(binary) {
        Ok(())
    } else {
        Err(AdminError::dependency(binary, "not found in PATH"))
    }
}

/// Make sure `binary` is available, installing its package with apt when
/// it is missing.
pub fn ensure_binary(runner: &dyn CommandRunner, binary: &str) -> Result<()> {
    if runner.binary_exists(binary) {
        return Ok(());
    }

    let Some(package) = package_for_binary(binary) else {
        return Err(AdminError::dependency(binary, "not found and no package is known for it"));
    };
    require_binary(runner, "apt-get")
        .map_err(|_| AdminError::dependency(binary, format!("missing and apt-get is unavailable to install {package}")))?;

    tracing::warn!("{binary} not found, installing {package}");
    let output = runner.run(&AptInstall::packages([package]))?;
    if !output.success {
        return Err(AdminError::dependency(
            binary,
            format!("apt-get install {package} failed ({})", output.failure_summary()),
        ));
    }

    if output.dry_run || runner.binary_exists(binary) {
        tracing::info!("Installed {package}");
        Ok(())
    } else {
        Err(AdminError::dependency(
            binary,
            format!("still missing after installing {package}"),
        ))
    }
}
