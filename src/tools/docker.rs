//! Docker Compose project control.

use std::path::PathBuf;

use strum::{Display, EnumString};

use super::ToolCommand;

/// Compose actions used while backing up a service's config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ComposeAction {
    /// Stop containers, releasing their file locks.
    Stop,
    /// Start containers again, detached.
    Up,
}

/// `docker compose --project-directory <dir> <action>`
#[derive(Debug, Clone)]
pub struct Compose {
    pub project_dir: PathBuf,
    pub action: ComposeAction,
}

impl ToolCommand for Compose {
    fn program(&self) -> &'static str {
        "docker"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec![
            "compose".to_string(),
            "--project-directory".to_string(),
            self.project_dir.display().to_string(),
            self.action.to_string(),
        ];
        if self.action == ComposeAction::Up {
            args.push("-d".to_string());
        }
        args
    }
}
