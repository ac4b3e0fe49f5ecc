//! Remote-desktop package installer
//!
//! Downloads a release `.deb` for the host architecture and installs it
//! through apt so its dependencies are resolved. The download lives in a
//! temporary directory that is removed however the install ends.

use std::fs;
use std::path::Path;

use crate::command_runner::CommandRunner;
use crate::error::{AdminError, Result};
use crate::sanity;
use crate::tools::apt::{AptInstall, DpkgQueryVersion};
use crate::tools::wget::Wget;
use crate::types::Arch;

/// A resolved install request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDesktopRequest {
    pub package: String,
    pub version: String,
    pub arch: Arch,
    /// URL with `{version}` and `{arch}` placeholders
    pub url_template: String,
    /// Reinstall even when the version is already installed
    pub force: bool,
}

impl RemoteDesktopRequest {
    pub fn download_url(&self) -> String {
        self.url_template
            .replace("{version}", &self.version)
            .replace("{arch}", &self.arch.to_string())
    }

    /// Local file name for the download: last URL segment, or a name built
    /// from the package when the URL ends oddly.
    pub fn file_name(&self) -> String {
        let url = self.download_url();
        match url.rsplit('/').next() {
            Some(last) if last.ends_with(".deb") && !last.contains(['?', '#']) => last.to_string(),
            _ => format!("{}-{}-{}.deb", self.package, self.version, self.arch),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed { version: String },
    AlreadyInstalled { version: String },
}

/// Version of `package` dpkg reports as installed, if any.
pub fn installed_version(runner: &dyn CommandRunner, package: &str) -> Result<Option<String>> {
    let output = runner.run(&DpkgQueryVersion {
        package: package.to_string(),
    })?;
    let version = output.stdout.trim();
    if output.success && !version.is_empty() {
        Ok(Some(version.to_string()))
    } else {
        Ok(None)
    }
}

pub fn install_remote_desktop(
    request: &RemoteDesktopRequest,
    runner: &dyn CommandRunner,
) -> Result<InstallOutcome> {
    sanity::require_binary(runner, "apt-get")?;
    sanity::ensure_binary(runner, "wget")?;

    if !request.force {
        if let Some(installed) = installed_version(runner, &request.package)? {
            if installed == request.version {
                tracing::info!("{} {installed} is already installed", request.package);
                return Ok(InstallOutcome::AlreadyInstalled { version: installed });
            }
            tracing::info!(
                "{} {installed} installed, upgrading to {}",
                request.package,
                request.version
            );
        }
    }

    let download_dir = tempfile::Builder::new()
        .prefix("dietpi-admin-download-")
        .tempdir()?;
    let package_file = download_dir.path().join(request.file_name());
    let url = request.download_url();

    tracing::info!("Downloading {url}");
    let output = runner.run(&Wget {
        url: url.clone(),
        output: package_file.clone(),
    })?;
    if !output.success {
        return Err(AdminError::DownloadFailed(format!(
            "{url}: {}",
            output.failure_summary()
        )));
    }
    if !output.dry_run {
        check_download(&package_file, &url)?;
    }

    tracing::info!("Installing {:?}", package_file);
    let output = runner.run(&AptInstall::local_deb(&package_file))?;
    if !output.success {
        return Err(AdminError::InstallFailed(format!(
            "{} {}: {}",
            request.package,
            request.version,
            output.failure_summary()
        )));
    }

    tracing::info!("{} {} installed", request.package, request.version);
    Ok(InstallOutcome::Installed {
        version: request.version.clone(),
    })
}

/// wget can exit 0 and still leave an empty file behind
fn check_download(path: &Path, url: &str) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(AdminError::DownloadFailed(format!("{url}: downloaded file is empty"))),
        Err(e) => Err(AdminError::DownloadFailed(format!("{url}: {e}"))),
    }
}
