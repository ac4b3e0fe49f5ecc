//! dietpi-admin Library
//!
//! Host administration for a DietPi machine: remote-desktop install, CIFS
//! share provisioning, rotating directory backups and Docker config backups.

pub mod backup;
pub mod cli;
pub mod command_runner;
pub mod config_file;
pub mod docker_backup;
pub mod error;
pub mod fstab;
pub mod installer;
pub mod logging;
pub mod mounts;
pub mod process_guard;
pub mod retention;
pub mod sanity;
pub mod share;
pub mod tools;
pub mod types;

// Re-export main types for convenience
pub use backup::{BackupJob, RotationReport, run_backup};
pub use command_runner::{CommandOutput, CommandRunner, SystemRunner};
pub use config_file::AdminConfig;
pub use docker_backup::{DockerBackupJob, DockerBackupReport, run_docker_backup};
pub use error::{AdminError, Result};
pub use installer::{InstallOutcome, RemoteDesktopRequest, install_remote_desktop};
pub use mounts::{MountProbe, ProcMounts};
pub use process_guard::{ChildGuard, ChildRegistry, CommandProcessGroup};
pub use retention::ArchivePattern;
pub use share::{CifsCredentials, ShareReport, ShareSpec, provision_share};
pub use tools::ToolCommand;
pub use types::Arch;
