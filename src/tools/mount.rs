//! Mounting an fstab-configured filesystem.

use std::path::PathBuf;

use super::ToolCommand;

/// `mount <mount_point>`
///
/// Only the mount point is given, so `mount` reads source, type and options
/// from the fstab entry. Mounting then behaves the same at boot and here.
#[derive(Debug, Clone)]
pub struct MountFromFstab {
    pub mount_point: PathBuf,
}

impl ToolCommand for MountFromFstab {
    fn program(&self) -> &'static str {
        "mount"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![self.mount_point.display().to_string()]
    }
}
