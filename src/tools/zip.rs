use std::path::{Path, PathBuf};

use super::ToolCommand;

/// `zip -r -q -y <archive> .` run inside `source`.
///
/// Running from inside the source keeps archive paths relative to it. `-y`
/// stores symlinks as links instead of following them.
#[derive(Debug, Clone)]
pub struct ZipDirectory {
    pub archive: PathBuf,
    pub source: PathBuf,
}

impl ToolCommand for ZipDirectory {
    fn program(&self) -> &'static str {
        "zip"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-r".to_string(),
            "-q".to_string(),
            "-y".to_string(),
            self.archive.display().to_string(),
            ".".to_string(),
        ]
    }

    fn working_dir(&self) -> Option<&Path> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zip_runs_inside_source() {
        let cmd = ZipDirectory {
            archive: PathBuf::from("/tmp/stage/dietpi-backup-2024-03-01.zip"),
            source: PathBuf::from("/mnt/dietpi-backup"),
        };
        assert_eq!(
            cmd.to_cli_args(),
            vec!["-r", "-q", "-y", "/tmp/stage/dietpi-backup-2024-03-01.zip", "."]
        );
        assert_eq!(cmd.working_dir(), Some(Path::new("/mnt/dietpi-backup")));
    }
}
