//! Error handling module for dietpi-admin
//!
//! Every failure a subcommand can hit has its own variant so the binary can
//! log a precise message. All of them are fatal and map to exit code 1.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for dietpi-admin
#[derive(Error, Debug)]
pub enum AdminError {
    /// IO errors (file operations, directory listing, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation errors (config values, CLI overrides)
    #[error("Validation error: {0}")]
    Validation(String),

    /// An external command could not be spawned or waited on
    #[error("Command error: {0}")]
    Command(String),

    /// Package download failed or produced an empty file
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Package manager refused to install the package
    #[error("Install failed: {0}")]
    InstallFailed(String),

    /// A required tool is absent and could not be installed
    #[error("Missing dependency '{tool}': {reason}")]
    DependencyMissing { tool: String, reason: String },

    /// The file server did not answer on the SMB port
    #[error("Share server unreachable: {0}")]
    MountUnreachable(String),

    /// Every mount attempt failed; `diagnostics` holds the kernel's cifs lines
    #[error("Mount of {mount_point:?} failed after {attempts} attempts")]
    MountFailed {
        mount_point: PathBuf,
        attempts: u32,
        diagnostics: Vec<String>,
    },

    /// The mount is live but cannot be written to
    #[error("Mount point {path:?} is not writable: {reason}")]
    MountNotWritable { path: PathBuf, reason: String },

    /// Backup source does not exist or is not a directory
    #[error("Source directory {0:?} not found or is not a directory")]
    SourceMissing(PathBuf),

    /// Backup destination is not an active mount point
    #[error("Destination {0:?} is not a mounted filesystem")]
    DestinationNotMounted(PathBuf),

    /// Compression step failed
    #[error("Archive creation failed: {0}")]
    ArchiveFailed(String),

    /// Moving the archive to the destination failed
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// The oldest archive could not be deleted
    #[error("Could not evict old archive {path:?}: {reason}")]
    EvictionFailed { path: PathBuf, reason: String },
}

/// Result type alias for dietpi-admin operations
pub type Result<T> = std::result::Result<T, AdminError>;

// Convenient error constructors
impl AdminError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a command error
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    /// Create a dependency error
    pub fn dependency(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DependencyMissing {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Process exit code for this error.
    ///
    /// Every detected failure exits with 1.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
