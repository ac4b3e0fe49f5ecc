//! fstab entry management.
//!
//! The share is mounted through fstab so it comes back after a reboot. The
//! file is edited line-wise: comments, blank lines and foreign entries are
//! preserved byte for byte, and a mount point never gets a second entry.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::mounts::{escape_octal, unescape_octal};

/// A CIFS line for fstab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CifsFstabEntry {
    pub share: String,
    pub mount_point: PathBuf,
    pub credentials_path: PathBuf,
    pub uid: u32,
    pub gid: u32,
    pub smb_version: String,
}

impl CifsFstabEntry {
    /// `_netdev` waits for the network at boot; `nofail` keeps an offline
    /// NAS from dropping the board into emergency mode.
    pub fn options(&self) -> String {
        format!(
            "credentials={},uid={},gid={},vers={},iocharset=utf8,_netdev,nofail",
            self.credentials_path.display(),
            self.uid,
            self.gid,
            self.smb_version
        )
    }

    pub fn to_line(&self) -> String {
        format!(
            "{} {} cifs {} 0 0",
            escape_octal(&self.share),
            escape_octal(&self.mount_point.display().to_string()),
            self.options()
        )
    }
}

/// Mount point field of an fstab line, if it is an entry at all.
fn entry_mount_point(line: &str) -> Option<PathBuf> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let mut fields = trimmed.split_whitespace();
    fields.next()?;
    fields.next().map(|mp| PathBuf::from(unescape_octal(mp)))
}

/// Put `entry` into `content`: replace the first line for the same mount
/// point, drop later duplicates, or append. Returns the new content and
/// whether anything changed.
pub fn upsert_entry(content: &str, entry: &CifsFstabEntry) -> (String, bool) {
    let wanted = entry.to_line();
    let mut lines: Vec<String> = Vec::new();
    let mut placed = false;
    let mut changed = false;

    for line in content.lines() {
        if entry_mount_point(line).as_deref() == Some(entry.mount_point.as_path()) {
            if placed {
                changed = true;
                continue;
            }
            placed = true;
            if line != wanted {
                changed = true;
            }
            lines.push(wanted.clone());
        } else {
            lines.push(line.to_string());
        }
    }

    if !placed {
        lines.push(wanted);
        changed = true;
    }

    let mut out = lines.join("\n");
    out.push('\n');
    (out, changed)
}

/// Write `entry` into the fstab at `path`. The old file is kept as
/// `<path>.bak` and the new one is renamed into place.
pub fn install_entry(path: &Path, entry: &CifsFstabEntry, dry_run: bool) -> Result<bool> {
    let current = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let (updated, changed) = upsert_entry(&current, entry);
    if !changed {
        tracing::info!("fstab already has the entry for {:?}", entry.mount_point);
        return Ok(false);
    }
    if dry_run {
        tracing::info!("[DRY RUN] Would write fstab entry: {}", entry.to_line());
        return Ok(true);
    }

    if path.exists() {
        fs::copy(path, backup_path(path))?;
    }

    let staged = sibling_with_suffix(path, ".dietpi-admin.tmp");
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(&staged)?;
        file.write_all(updated.as_bytes())?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&staged, path) {
        let _ = fs::remove_file(&staged);
        return Err(e.into());
    }

    tracing::info!("fstab entry written for {:?}", entry.mount_point);
    Ok(true)
}

pub fn backup_path(path: &Path) -> PathBuf {
    sibling_with_suffix(path, ".bak")
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}
