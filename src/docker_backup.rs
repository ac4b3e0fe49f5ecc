//! Docker service config backup
//!
//! Each sub-directory of the config root belongs to one compose service.
//! The folders are copied into a staging directory, zipped next to it and
//! rotated. A folder that fails to copy (usually a database holding a lock)
//! gets one more try with its compose project stopped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use walkdir::WalkDir;

use crate::command_runner::CommandRunner;
use crate::error::{AdminError, Result};
use crate::process_guard::ScratchGuard;
use crate::retention::{self, ArchivePattern};
use crate::sanity;
use crate::tools::docker::{Compose, ComposeAction};
use crate::tools::zip::ZipDirectory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerBackupJob {
    /// One sub-directory per service
    pub source: PathBuf,
    /// Copies land here; archives go in its parent
    pub staging_dir: PathBuf,
    /// `<compose_root>/<service>` is the compose project of a service
    pub compose_root: PathBuf,
    pub max_backups: usize,
    /// Pause between `docker compose stop` and the retry
    pub lock_release_wait: Duration,
}

impl DockerBackupJob {
    /// Directory the archives are written to.
    pub fn archive_dir(&self) -> PathBuf {
        self.staging_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DockerBackupReport {
    pub copied: Vec<String>,
    pub failed: Vec<String>,
    pub archive: Option<PathBuf>,
    pub evicted: Vec<PathBuf>,
}

pub fn run_docker_backup(
    job: &DockerBackupJob,
    now: NaiveDateTime,
    runner: &dyn CommandRunner,
) -> Result<DockerBackupReport> {
    if !job.source.is_dir() {
        return Err(AdminError::SourceMissing(job.source.clone()));
    }
    sanity::ensure_binary(runner, "zip")?;

    let dry_run = runner.is_dry_run();
    if !dry_run {
        fs::create_dir_all(&job.staging_dir)?;
    }
    let _scratch = (!dry_run).then(|| ScratchGuard::register(&job.staging_dir));

    tracing::info!("Docker config backup: {:?} -> {:?}", job.source, job.staging_dir);
    let mut report = DockerBackupReport::default();

    for (name, path) in service_dirs(&job.source)? {
        let dest = job.staging_dir.join(&name);
        if dry_run {
            tracing::info!("[DRY RUN] Would copy {:?} to {:?}", path, dest);
            report.copied.push(name);
            continue;
        }

        if backup_service(job, &name, &path, &dest, runner) {
            report.copied.push(name);
        } else {
            report.failed.push(name);
        }
    }

    tracing::info!(
        "Copied {} service folders, {} failed",
        report.copied.len(),
        report.failed.len()
    );
    if report.copied.is_empty() && report.failed.is_empty() {
        tracing::info!("No service folders found, skipping archive");
        return Ok(report);
    }

    // zip runs inside the staging directory; a relative archive path would land there
    let archive_dir = std::path::absolute(job.archive_dir())?;
    let archive = archive_dir.join(ArchivePattern::DOCKER_CONFIGS.file_name(now));
    let output = runner.run(&ZipDirectory {
        archive: archive.clone(),
        source: job.staging_dir.clone(),
    })?;
    if !output.success {
        return Err(AdminError::ArchiveFailed(output.failure_summary()));
    }
    if !output.dry_run && !archive.is_file() {
        return Err(AdminError::ArchiveFailed(format!(
            "zip reported success but {archive:?} was not created"
        )));
    }
    tracing::info!("Created {:?}", archive);
    report.archive = Some(archive);

    if dry_run {
        return Ok(report);
    }

    report.evicted = finish(&archive_dir, &job.staging_dir, job.max_backups);
    Ok(report)
}

/// Rotate and remove the staging copies. The archive already exists, so
/// problems here are logged rather than failing the run.
fn finish(archive_dir: &Path, staging_dir: &Path, keep: usize) -> Vec<PathBuf> {
    let evicted = rotate(archive_dir, keep).unwrap_or_else(|e| {
        tracing::error!("Rotating archives in {:?} failed: {e}", archive_dir);
        Vec::new()
    });

    if let Err(e) = fs::remove_dir_all(staging_dir) {
        tracing::error!("Failed to remove staging directory {:?}: {e}", staging_dir);
    }
    evicted
}

/// Top-level directories of `root`, sorted by name.
fn service_dirs(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() {
            dirs.push((name, path));
        } else {
            tracing::debug!("Skipping non-directory {:?}", path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Copy one service folder, stopping its compose project for a retry if
/// the first copy fails. Returns whether the folder ended up copied.
fn backup_service(
    job: &DockerBackupJob,
    name: &str,
    source: &Path,
    dest: &Path,
    runner: &dyn CommandRunner,
) -> bool {
    let first = clear_path(dest).and_then(|()| copy_tree(source, dest));
    let Err(e) = first else {
        tracing::info!("Backed up {name}");
        return true;
    };
    tracing::error!("Copying {name} failed: {e}");

    let project_dir = job.compose_root.join(name);
    if !project_dir.is_dir() {
        tracing::warn!("No compose project for {name} at {:?}; not retrying", project_dir);
        return false;
    }

    let stopped = compose(runner, &project_dir, ComposeAction::Stop);
    let copied = if stopped {
        tracing::info!("Waiting {:?} for {name} to release its files", job.lock_release_wait);
        std::thread::sleep(job.lock_release_wait);
        match clear_path(dest).and_then(|()| copy_tree(source, dest)) {
            Ok(()) => {
                tracing::info!("Backed up {name} with its containers stopped");
                true
            }
            Err(e) => {
                tracing::error!("Retry of {name} failed: {e}");
                false
            }
        }
    } else {
        false
    };

    compose(runner, &project_dir, ComposeAction::Up);
    copied
}

fn compose(runner: &dyn CommandRunner, project_dir: &Path, action: ComposeAction) -> bool {
    let command = Compose {
        project_dir: project_dir.to_path_buf(),
        action,
    };
    match runner.run(&command) {
        Ok(output) if output.success => true,
        Ok(output) => {
            tracing::error!("docker compose {action} in {:?} failed: {}", project_dir, output.failure_summary());
            false
        }
        Err(e) => {
            tracing::error!("docker compose {action} in {:?} failed: {e}", project_dir);
            false
        }
    }
}

/// Remove whatever is at `path`, if anything.
fn clear_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Recursive copy that recreates symlinks instead of following them.
pub fn copy_tree(source: &Path, dest: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            std::os::unix::fs::symlink(&link, &target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| {
                io::Error::new(e.kind(), format!("{}: {e}", entry.path().display()))
            })?;
        }
    }
    Ok(())
}

/// Delete docker archives beyond the newest `keep`. Failures are logged
/// per file; the returned list holds what was actually removed.
pub fn rotate(archive_dir: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    let paths = retention::list_archives(archive_dir, &ArchivePattern::DOCKER_CONFIGS)?
        .into_iter()
        .map(|entry| entry.path)
        .collect();

    let mut evicted = Vec::new();
    for path in retention::excess_by_name(paths, keep) {
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("Removed old archive {:?}", path);
                evicted.push(path);
            }
            Err(e) => tracing::error!("Failed to remove {:?}: {e}", path),
        }
    }
    Ok(evicted)
}
