//! Backup rotation: zip a directory, move it onto a mounted share, evict
//! the oldest archive.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::command_runner::CommandRunner;
use crate::error::{AdminError, Result};
use crate::mounts::MountProbe;
use crate::process_guard::ScratchGuard;
use crate::retention::{self, ArchivePattern};
use crate::sanity;
use crate::tools::zip::ZipDirectory;

/// One backup run's inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupJob {
    pub source: PathBuf,
    /// Directory the archives end up in
    pub destination: PathBuf,
    /// Filesystem that must be mounted before anything is moved
    pub mount_point: PathBuf,
    pub max_backups: usize,
    /// Parent of the private staging directory
    pub staging_root: PathBuf,
}

/// Result of a completed rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationReport {
    pub archive: PathBuf,
    /// An archive with the same name (same day) was overwritten
    pub replaced_existing: bool,
    pub evicted: Option<PathBuf>,
    /// Matching archives left in the destination
    pub retained: usize,
}

pub fn run_backup(
    job: &BackupJob,
    date: NaiveDate,
    runner: &dyn CommandRunner,
    probe: &dyn MountProbe,
) -> Result<RotationReport> {
    if !job.source.is_dir() {
        return Err(AdminError::SourceMissing(job.source.clone()));
    }
    sanity::ensure_binary(runner, "zip")?;

    let name = ArchivePattern::DIETPI.file_name_for_date(date);
    tracing::info!("Backing up {:?} as {name}", job.source);

    // Dropped on every exit path, taking the staged archive with it
    fs::create_dir_all(&job.staging_root)?;
    let staging = tempfile::Builder::new()
        .prefix("dietpi-admin-staging-")
        .tempdir_in(&job.staging_root)?;
    let _scratch = ScratchGuard::register(staging.path());
    let staged = staging.path().join(&name);

    let zip = ZipDirectory {
        archive: staged.clone(),
        source: job.source.clone(),
    };
    let output = runner.run(&zip)?;
    if !output.success {
        return Err(AdminError::ArchiveFailed(output.failure_summary()));
    }
    if !output.dry_run && !staged.is_file() {
        return Err(AdminError::ArchiveFailed(format!(
            "zip reported success but {staged:?} was not created"
        )));
    }

    if !probe.is_mounted(&job.mount_point)? {
        return Err(AdminError::DestinationNotMounted(job.mount_point.clone()));
    }

    let target = job.destination.join(&name);
    if output.dry_run {
        tracing::info!("[DRY RUN] Would move archive to {:?}", target);
        let retained = count_archives(&job.destination)?;
        return Ok(RotationReport {
            archive: target,
            replaced_existing: false,
            evicted: None,
            retained,
        });
    }

    fs::create_dir_all(&job.destination)
        .map_err(|e| AdminError::TransferFailed(format!("cannot create {:?}: {e}", job.destination)))?;

    let replaced_existing = target.exists();
    transfer(&staged, &target)?;
    tracing::info!("Archive stored at {:?}", target);

    let evicted = if replaced_existing {
        tracing::warn!("Replaced existing archive {name} from an earlier run today; skipping eviction");
        None
    } else {
        prune_oldest(&job.destination, job.max_backups)?
    };

    Ok(RotationReport {
        archive: target,
        replaced_existing,
        evicted,
        retained: count_archives(&job.destination)?,
    })
}

fn count_archives(dir: &Path) -> Result<usize> {
    match retention::list_archives(dir, &ArchivePattern::DIETPI) {
        Ok(archives) => Ok(archives.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Move `staged` to `target`, copying when they are on different filesystems.
pub fn transfer(staged: &Path, target: &Path) -> Result<()> {
    match fs::rename(staged, target) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!("{:?} is on another filesystem, copying", target);
            copy_then_rename(staged, target)
        }
        Err(e) => Err(AdminError::TransferFailed(format!(
            "cannot move {staged:?} to {target:?}: {e}"
        ))),
    }
}

/// Hidden `.<name>.partial` next to `target`.
pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(target.file_name().unwrap_or_default());
    name.push(".partial");
    target.with_file_name(name)
}

/// Copy into a `.partial` file, fsync, then rename over `target`. The
/// target name never refers to a half-written archive.
pub fn copy_then_rename(staged: &Path, target: &Path) -> Result<()> {
    let partial = partial_path(target);
    let _scratch = ScratchGuard::register(&partial);

    let copy = || -> io::Result<()> {
        let mut from = File::open(staged)?;
        let mut to = File::create(&partial)?;
        io::copy(&mut from, &mut to)?;
        to.sync_all()?;
        fs::rename(&partial, target)
    };

    if let Err(e) = copy() {
        let _ = fs::remove_file(&partial);
        return Err(AdminError::TransferFailed(format!(
            "cannot copy {staged:?} to {target:?}: {e}"
        )));
    }

    if let Err(e) = fs::remove_file(staged) {
        tracing::warn!("Could not remove staged archive {:?}: {e}", staged);
    }
    Ok(())
}

/// Delete the single oldest archive when more than `max_backups` exist.
pub fn prune_oldest(destination: &Path, max_backups: usize) -> Result<Option<PathBuf>> {
    prune_oldest_with(destination, max_backups, |path| fs::remove_file(path))
}

/// `prune_oldest` with the delete step supplied by the caller.
pub fn prune_oldest_with<F>(
    destination: &Path,
    max_backups: usize,
    mut remove: F,
) -> Result<Option<PathBuf>>
where
    F: FnMut(&Path) -> io::Result<()>,
{
    let archives = retention::list_archives(destination, &ArchivePattern::DIETPI)?;
    if archives.len() <= max_backups {
        tracing::debug!("{} archives, limit {max_backups}: nothing to evict", archives.len());
        return Ok(None);
    }

    let Some(oldest) = retention::oldest_by_mtime(&archives) else {
        return Ok(None);
    };
    remove(&oldest.path).map_err(|e| AdminError::EvictionFailed {
        path: oldest.path.clone(),
        reason: e.to_string(),
    })?;

    tracing::info!("Evicted oldest archive {:?}", oldest.path);
    Ok(Some(oldest.path.clone()))
}
