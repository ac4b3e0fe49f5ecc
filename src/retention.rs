//! Archive naming and retention.
//!
//! Two archive families live on the share:
//!
//! | Family         | Name                                         | Eviction                 |
//! |----------------|----------------------------------------------|--------------------------|
//! | DietPi backup  | `dietpi-backup-<YYYY-MM-DD>.zip`             | single oldest by mtime   |
//! | Docker configs | `docker_configs_backup_<YYYY-MM-DD_HH-MM-SS>.zip` | all beyond newest N by name |
//!
//! Only names that match a pattern exactly are ever considered for deletion,
//! so unrelated files in the destination are safe.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{NaiveDate, NaiveDateTime};

/// Whether the timestamp part carries a time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precision {
    Date,
    DateTime,
}

/// Naming scheme of one archive family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchivePattern {
    prefix: &'static str,
    format: &'static str,
    extension: &'static str,
    precision: Precision,
}

impl ArchivePattern {
    /// `dietpi-backup-<YYYY-MM-DD>.zip`, one per day.
    pub const DIETPI: ArchivePattern = ArchivePattern {
        prefix: "dietpi-backup-",
        format: "%Y-%m-%d",
        extension: ".zip",
        precision: Precision::Date,
    };

    /// `docker_configs_backup_<YYYY-MM-DD_HH-MM-SS>.zip`
    pub const DOCKER_CONFIGS: ArchivePattern = ArchivePattern {
        prefix: "docker_configs_backup_",
        format: "%Y-%m-%d_%H-%M-%S",
        extension: ".zip",
        precision: Precision::DateTime,
    };

    /// File name for an archive taken at `at`.
    pub fn file_name(&self, at: NaiveDateTime) -> String {
        format!("{}{}{}", self.prefix, at.format(self.format), self.extension)
    }

    /// File name for a date-only family.
    pub fn file_name_for_date(&self, date: NaiveDate) -> String {
        self.file_name(date.and_time(chrono::NaiveTime::MIN))
    }

    /// True when `name` is exactly prefix + valid timestamp + extension.
    pub fn matches(&self, name: &str) -> bool {
        let Some(stamp) = name
            .strip_prefix(self.prefix)
            .and_then(|rest| rest.strip_suffix(self.extension))
        else {
            return false;
        };
        // Re-formatting rejects unpadded variants chrono would accept
        match self.precision {
            Precision::Date => NaiveDate::parse_from_str(stamp, self.format)
                .map(|d| d.format(self.format).to_string() == stamp)
                .unwrap_or(false),
            Precision::DateTime => NaiveDateTime::parse_from_str(stamp, self.format)
                .map(|d| d.format(self.format).to_string() == stamp)
                .unwrap_or(false),
        }
    }
}

/// An archive found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl ArchiveEntry {
    fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

/// Regular files in `dir` whose names match `pattern`.
pub fn list_archives(dir: &Path, pattern: &ArchivePattern) -> io::Result<Vec<ArchiveEntry>> {
    let mut archives = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !pattern.matches(name) {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        archives.push(ArchiveEntry {
            path: entry.path(),
            modified: metadata.modified()?,
        });
    }
    Ok(archives)
}

/// The single oldest archive by modification time. Equal times fall back
/// to name order so the choice is deterministic.
pub fn oldest_by_mtime(entries: &[ArchiveEntry]) -> Option<&ArchiveEntry> {
    entries
        .iter()
        .min_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.file_name().cmp(b.file_name())))
}

/// Archives to delete so that only the newest `keep` remain, by name order.
///
/// Timestamped names sort chronologically, so the returned list is
/// oldest-first.
pub fn excess_by_name(mut paths: Vec<PathBuf>, keep: usize) -> Vec<PathBuf> {
    if paths.len() <= keep {
        return Vec::new();
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    let excess = paths.len() - keep;
    paths.truncate(excess);
    paths
}
