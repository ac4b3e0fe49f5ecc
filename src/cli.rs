use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config_file::{
    AdminConfig, BackupConfig, DEFAULT_CONFIG_PATH, DockerBackupConfig, InstallerConfig,
    ShareConfig,
};
use crate::types::Arch;

/// dietpi-admin - host administration for DietPi
#[derive(Parser, Debug)]
#[command(name = "dietpi-admin")]
#[command(about = "Install remote desktop, mount a CIFS share and rotate backups on DietPi")]
#[command(version)]
pub struct Cli {
    /// Configuration file; built-in defaults apply when it does not exist
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Dry-run mode: show what would be executed without making changes.
    ///
    /// Installs, mounts, archive moves and deletions are skipped and logged.
    /// Read-only probes (which, dpkg-query, dmesg) still run so the preview
    /// is realistic.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Log file (overrides `log_file` from the configuration)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download and install the remote-desktop package
    InstallRemoteDesktop(InstallArgs),
    /// Provision the CIFS share: credentials, fstab entry, mount, write test
    MountShare(MountArgs),
    /// Zip the backup source onto the share and evict the oldest archive
    Backup(BackupArgs),
    /// Copy Docker service configs, zip and rotate them
    DockerBackup(DockerBackupArgs),
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        path: PathBuf,
    },
    /// Write a configuration file with default values
    InitConfig {
        /// Where to write the configuration
        path: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
pub struct InstallArgs {
    /// Package version to install
    #[arg(long)]
    pub version: Option<String>,
    /// Package architecture (x86_64, aarch64, armv7)
    #[arg(long)]
    pub arch: Option<Arch>,
    /// Reinstall even if this version is already installed
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug, Default)]
pub struct MountArgs {
    /// Share in //server/share form
    #[arg(long)]
    pub share: Option<String>,
    #[arg(long)]
    pub mount_point: Option<PathBuf>,
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub domain: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct BackupArgs {
    /// Directory to archive
    #[arg(long)]
    pub source: Option<PathBuf>,
    /// Directory on the mounted share receiving the archives
    #[arg(long)]
    pub destination: Option<PathBuf>,
    /// Mount that must be live before the archive is moved
    #[arg(long)]
    pub mount_point: Option<PathBuf>,
    /// Archives to keep before the oldest is evicted
    #[arg(long)]
    pub max_backups: Option<usize>,
}

#[derive(Args, Debug, Default)]
pub struct DockerBackupArgs {
    /// Directory holding one config folder per service
    #[arg(long)]
    pub source: Option<PathBuf>,
    /// Staging directory; archives are written to its parent
    #[arg(long)]
    pub staging: Option<PathBuf>,
    /// Directory holding one compose project per service
    #[arg(long)]
    pub compose_root: Option<PathBuf>,
    #[arg(long)]
    pub max_backups: Option<usize>,
}

impl InstallArgs {
    pub fn apply(&self, config: &mut InstallerConfig) {
        if let Some(version) = &self.version {
            config.version = version.clone();
        }
        if let Some(arch) = self.arch {
            config.arch = Some(arch);
        }
    }
}

impl MountArgs {
    pub fn apply(&self, config: &mut ShareConfig) {
        if let Some(share) = &self.share {
            config.share = share.clone();
        }
        if let Some(mount_point) = &self.mount_point {
            config.mount_point = mount_point.clone();
        }
        if let Some(username) = &self.username {
            config.username = username.clone();
        }
        if let Some(domain) = &self.domain {
            config.domain = domain.clone();
        }
    }
}

impl BackupArgs {
    pub fn apply(&self, config: &mut BackupConfig) {
        if let Some(source) = &self.source {
            config.source = source.clone();
        }
        if let Some(destination) = &self.destination {
            config.destination = destination.clone();
        }
        if let Some(mount_point) = &self.mount_point {
            config.mount_point = Some(mount_point.clone());
        }
        if let Some(max) = self.max_backups {
            config.max_backups = max;
        }
    }
}

impl DockerBackupArgs {
    pub fn apply(&self, config: &mut DockerBackupConfig) {
        if let Some(source) = &self.source {
            config.source = source.clone();
        }
        if let Some(staging) = &self.staging {
            config.staging_dir = staging.clone();
        }
        if let Some(compose_root) = &self.compose_root {
            config.compose_root = compose_root.clone();
        }
        if let Some(max) = self.max_backups {
            config.max_backups = max;
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Apply the subcommand's flags on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut AdminConfig) {
        if let Some(log_file) = &self.log_file {
            config.log_file = log_file.clone();
        }
        match &self.command {
            Commands::InstallRemoteDesktop(args) => args.apply(&mut config.installer),
            Commands::MountShare(args) => args.apply(&mut config.share),
            Commands::Backup(args) => args.apply(&mut config.backup),
            Commands::DockerBackup(args) => args.apply(&mut config.docker_backup),
            Commands::Validate { .. } | Commands::InitConfig { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_requires_subcommand() {
        let result = Cli::try_parse_from(["dietpi-admin"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::try_parse_from([
            "dietpi-admin",
            "backup",
            "--dry-run",
            "-vv",
            "--config",
            "/tmp/c.json",
        ])
        .unwrap();
        assert!(cli.dry_run);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, PathBuf::from("/tmp/c.json"));
        assert!(matches!(cli.command, Commands::Backup(_)));
    }

    #[test]
    fn test_cli_default_config_path() {
        let cli = Cli::try_parse_from(["dietpi-admin", "mount-share"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_cli_install_flags() {
        let cli = Cli::try_parse_from([
            "dietpi-admin",
            "install-remote-desktop",
            "--version",
            "1.4.0",
            "--arch",
            "armv7",
            "--force",
        ])
        .unwrap();
        match cli.command {
            Commands::InstallRemoteDesktop(args) => {
                assert_eq!(args.version.as_deref(), Some("1.4.0"));
                assert_eq!(args.arch, Some(Arch::Armv7));
                assert!(args.force);
            }
            _ => panic!("Expected InstallRemoteDesktop command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_arch() {
        let result = Cli::try_parse_from(["dietpi-admin", "install-remote-desktop", "--arch", "mips"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_validate_command() {
        let cli = Cli::try_parse_from(["dietpi-admin", "validate", "/path/to/config.json"]).unwrap();
        match cli.command {
            Commands::Validate { path } => {
                assert_eq!(path.to_str().unwrap(), "/path/to/config.json");
            }
            _ => panic!("Expected Validate command"),
        }
    }

    #[test]
    fn test_overrides_replace_only_given_values() {
        let cli = Cli::try_parse_from([
            "dietpi-admin",
            "--log-file",
            "/tmp/admin.log",
            "backup",
            "--destination",
            "/mnt/other/backups",
            "--max-backups",
            "3",
        ])
        .unwrap();
        let mut config = AdminConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.log_file, PathBuf::from("/tmp/admin.log"));
        assert_eq!(config.backup.destination, PathBuf::from("/mnt/other/backups"));
        assert_eq!(config.backup.max_backups, 3);
        assert_eq!(config.backup.source, BackupConfig::default().source);
    }

    #[test]
    fn test_backup_destination_on_another_mount() {
        let cli = Cli::try_parse_from([
            "dietpi-admin",
            "backup",
            "--destination",
            "/mnt/usb/dietpi-backups",
            "--mount-point",
            "/mnt/usb",
        ])
        .unwrap();
        let mut config = AdminConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.backup.mount_point, Some(PathBuf::from("/mnt/usb")));
        config.backup.validate().expect("destination is on the given mount");
        assert_eq!(config.backup.to_job().mount_point, PathBuf::from("/mnt/usb"));
    }

    #[test]
    fn test_mount_share_overrides() {
        let cli = Cli::try_parse_from([
            "dietpi-admin",
            "mount-share",
            "--share",
            "//10.0.0.2/media",
            "--mount-point",
            "/mnt/media",
        ])
        .unwrap();
        let mut config = AdminConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.share.share, "//10.0.0.2/media");
        assert_eq!(config.share.mount_point, PathBuf::from("/mnt/media"));
        assert_eq!(config.share.username, ShareConfig::default().username);
    }

    #[test]
    fn test_docker_backup_overrides() {
        let cli = Cli::try_parse_from([
            "dietpi-admin",
            "docker-backup",
            "--staging",
            "/mnt/nas/docker/tmp",
            "--max-backups",
            "2",
        ])
        .unwrap();
        let mut config = AdminConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.docker_backup.staging_dir, PathBuf::from("/mnt/nas/docker/tmp"));
        assert_eq!(config.docker_backup.max_backups, 2);
    }
}
