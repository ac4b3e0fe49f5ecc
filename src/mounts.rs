//! Kernel mount table inspection.
//!
//! A destination counts as "mounted" only when it is the target of an entry
//! in `/proc/self/mounts`. An existing but empty directory under `/mnt` looks
//! fine to `is_dir()`, and writing a backup there would silently fill the SD
//! card instead of the share.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const PROC_MOUNTS: &str = "/proc/self/mounts";

/// One line of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: String,
    pub target: PathBuf,
    pub fstype: String,
    pub options: String,
}

/// Parse `/proc/mounts` format. Malformed lines are skipped.
pub fn parse_mount_table(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let target = fields.next()?;
            let fstype = fields.next()?;
            let options = fields.next().unwrap_or("");
            Some(MountEntry {
                source: unescape_octal(source),
                target: PathBuf::from(unescape_octal(target)),
                fstype: fstype.to_string(),
                options: options.to_string(),
            })
        })
        .collect()
}

/// Decode the kernel's `\ooo` escapes (space is `\040`).
pub fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_triplet(&bytes[i + 1..i + 4]) {
            let value = (bytes[i + 1] - b'0') * 64 + (bytes[i + 2] - b'0') * 8 + (bytes[i + 3] - b'0');
            out.push(value);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Encode spaces, tabs, newlines and backslashes the way fstab expects.
pub fn escape_octal(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            ' ' => out.push_str("\\040"),
            '\t' => out.push_str("\\011"),
            '\n' => out.push_str("\\012"),
            '\\' => out.push_str("\\134"),
            c => out.push(c),
        }
    }
    out
}

fn is_octal_triplet(bytes: &[u8]) -> bool {
    bytes.len() == 3 && bytes[0] <= b'3' && bytes.iter().all(|b| (b'0'..=b'7').contains(b))
}

/// Answers "is this path an active mount point".
pub trait MountProbe {
    fn is_mounted(&self, path: &Path) -> Result<bool>;
}

/// Reads a mount table file, `/proc/self/mounts` by default.
#[derive(Debug, Clone)]
pub struct ProcMounts {
    table: PathBuf,
}

impl ProcMounts {
    pub fn new() -> Self {
        Self {
            table: PathBuf::from(PROC_MOUNTS),
        }
    }

    /// Use a different table file (tests, chroots).
    pub fn with_table(table: impl Into<PathBuf>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn entries(&self) -> Result<Vec<MountEntry>> {
        let content = fs::read_to_string(&self.table)?;
        Ok(parse_mount_table(&content))
    }
}

impl Default for ProcMounts {
    fn default() -> Self {
        Self::new()
    }
}

impl MountProbe for ProcMounts {
    fn is_mounted(&self, path: &Path) -> Result<bool> {
        // The table holds canonical paths; a trailing slash or symlink in the
        // configured path must not hide a live mount
        let wanted = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        Ok(self
            .entries()?
            .iter()
            .any(|entry| entry.target == wanted))
    }
}
