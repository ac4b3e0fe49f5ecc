//! Configuration file handling.
//!
//! One JSON file holds a section per subcommand. Every field has a default,
//! so a partial file (or none at all) is valid and CLI flags only need to
//! override what differs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backup::BackupJob;
use crate::docker_backup::DockerBackupJob;
use crate::installer::RemoteDesktopRequest;
use crate::share::{CifsCredentials, ShareSpec};
use crate::types::Arch;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/dietpi-admin/config.json";

/// Overrides the share password from the config file
pub const PASSWORD_ENV: &str = "DIETPI_ADMIN_CIFS_PASSWORD";

/// Whole-tool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub log_file: PathBuf,
    pub installer: InstallerConfig,
    pub share: ShareConfig,
    pub backup: BackupConfig,
    pub docker_backup: DockerBackupConfig,
}

/// Remote-desktop package download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    pub package: String,
    pub version: String,
    /// None means the architecture of this host
    pub arch: Option<Arch>,
    /// `{version}` and `{arch}` are substituted
    pub url_template: String,
}

/// CIFS share provisioning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// `//server/share`
    pub share: String,
    pub mount_point: PathBuf,
    pub username: String,
    pub domain: String,
    pub password: String,
    pub credentials_file: PathBuf,
    pub fstab: PathBuf,
    pub uid: u32,
    pub gid: u32,
    pub smb_version: String,
    pub port: u16,
    pub attempts: u32,
    pub retry_delay_secs: u64,
    pub connect_timeout_secs: u64,
}

/// DietPi backup rotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Path that must be a live mount; the destination itself when unset
    pub mount_point: Option<PathBuf>,
    pub max_backups: usize,
    /// Where archives are built before the move
    pub staging_dir: PathBuf,
}

/// Docker service config backup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerBackupConfig {
    /// One sub-directory per service
    pub source: PathBuf,
    /// Copies land here; archives go to its parent
    pub staging_dir: PathBuf,
    /// `<compose_root>/<service>` holds each compose project
    pub compose_root: PathBuf,
    pub max_backups: usize,
    pub lock_release_wait_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("/var/log/dietpi-admin.log"),
            installer: InstallerConfig::default(),
            share: ShareConfig::default(),
            backup: BackupConfig::default(),
            docker_backup: DockerBackupConfig::default(),
        }
    }
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            package: "rustdesk".to_string(),
            version: "1.3.2".to_string(),
            arch: None,
            url_template:
                "https://github.com/rustdesk/rustdesk/releases/download/{version}/rustdesk-{version}-{arch}.deb"
                    .to_string(),
        }
    }
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            share: "//nas.local/backup".to_string(),
            mount_point: PathBuf::from("/mnt/nas"),
            username: "dietpi".to_string(),
            domain: "WORKGROUP".to_string(),
            password: String::new(),
            credentials_file: PathBuf::from("/root/.smbcredentials"),
            fstab: PathBuf::from("/etc/fstab"),
            uid: 1000,
            gid: 1000,
            smb_version: "3.0".to_string(),
            port: 445,
            attempts: 3,
            retry_delay_secs: 2,
            connect_timeout_secs: 5,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("/mnt/dietpi-backup"),
            destination: PathBuf::from("/mnt/nas/dietpi-backups"),
            mount_point: Some(PathBuf::from("/mnt/nas")),
            max_backups: 5,
            staging_dir: std::env::temp_dir(),
        }
    }
}

impl Default for DockerBackupConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("/home/dietpi/config"),
            staging_dir: PathBuf::from("/mnt/nas/docker_config/temp"),
            compose_root: PathBuf::from("/home/dietpi/docker"),
            max_backups: 7,
            lock_release_wait_secs: 10,
        }
    }
}

impl AdminConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
        }
        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            tracing::debug!("No configuration at {:?}, using defaults", path.as_ref());
            Ok(Self::default())
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.installer.validate()?;
        self.share.validate()?;
        self.backup.validate()?;
        self.docker_backup.validate()?;
        Ok(())
    }
}

impl InstallerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.package.trim().is_empty() {
            anyhow::bail!("Installer package name must be specified");
        }
        let version = self.version.trim();
        if version.is_empty() {
            anyhow::bail!("Installer version must be specified");
        }
        if version.contains('/') || version.contains(char::is_whitespace) {
            anyhow::bail!("Installer version cannot contain '/' or whitespace");
        }
        if !self.url_template.starts_with("https://") && !self.url_template.starts_with("http://") {
            anyhow::bail!("Installer URL template must start with http:// or https://");
        }
        if !self.url_template.contains("{version}") {
            anyhow::bail!("Installer URL template must contain {{version}}");
        }
        if !self.url_template.ends_with(".deb") {
            anyhow::bail!("Installer URL template must point at a .deb file");
        }
        Ok(())
    }

    /// Resolve into a request, filling in the host architecture if unset.
    pub fn to_request(&self, force: bool) -> Result<RemoteDesktopRequest> {
        let arch = match self.arch.or_else(Arch::host) {
            Some(arch) => arch,
            None => anyhow::bail!(
                "No package architecture for host '{}'; set installer.arch",
                std::env::consts::ARCH
            ),
        };
        Ok(RemoteDesktopRequest {
            package: self.package.clone(),
            version: self.version.trim().to_string(),
            arch,
            url_template: self.url_template.clone(),
            force,
        })
    }
}

impl ShareConfig {
    pub fn validate(&self) -> Result<()> {
        crate::share::server_host(&self.share)
            .with_context(|| format!("Invalid share '{}'", self.share))?;
        if !self.mount_point.is_absolute() {
            anyhow::bail!("Share mount point must be an absolute path");
        }
        if !self.credentials_file.is_absolute() {
            anyhow::bail!("Credentials file must be an absolute path");
        }
        if self.username.trim().is_empty() {
            anyhow::bail!("Share username must be specified");
        }
        if self.username.contains(char::is_whitespace) || self.domain.contains(char::is_whitespace) {
            anyhow::bail!("Share username and domain cannot contain whitespace");
        }
        if self.smb_version.trim().is_empty() {
            anyhow::bail!("SMB protocol version must be specified");
        }
        if self.attempts == 0 {
            anyhow::bail!("Mount attempts must be at least 1");
        }
        Ok(())
    }

    /// Resolve into a provisioning spec. The password comes from
    /// `DIETPI_ADMIN_CIFS_PASSWORD` when set, else from the file.
    pub fn to_spec(&self) -> Result<ShareSpec> {
        self.validate()?;
        let password = std::env::var(PASSWORD_ENV).unwrap_or_else(|_| self.password.clone());
        if password.is_empty() {
            anyhow::bail!("Share password not set; use share.password or {PASSWORD_ENV}");
        }
        if password.contains('\n') {
            anyhow::bail!("Share password cannot contain a newline");
        }
        Ok(ShareSpec {
            share: self.share.clone(),
            mount_point: self.mount_point.clone(),
            credentials: CifsCredentials::new(&self.username, &password, &self.domain),
            credentials_path: self.credentials_file.clone(),
            fstab_path: self.fstab.clone(),
            uid: self.uid,
            gid: self.gid,
            smb_version: self.smb_version.clone(),
            port: self.port,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            attempts: self.attempts,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        })
    }
}

impl BackupConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_backups == 0 {
            anyhow::bail!("backup.max_backups must be at least 1");
        }
        if !self.source.is_absolute() || !self.destination.is_absolute() {
            anyhow::bail!("Backup source and destination must be absolute paths");
        }
        if self.destination.starts_with(&self.source) {
            anyhow::bail!("Backup destination cannot be inside the source");
        }
        if let Some(mount_point) = &self.mount_point {
            if !self.destination.starts_with(mount_point) {
                anyhow::bail!("Backup destination must be on the configured mount point");
            }
        }
        Ok(())
    }

    pub fn to_job(&self) -> BackupJob {
        BackupJob {
            source: self.source.clone(),
            destination: self.destination.clone(),
            mount_point: self
                .mount_point
                .clone()
                .unwrap_or_else(|| self.destination.clone()),
            max_backups: self.max_backups,
            staging_root: self.staging_dir.clone(),
        }
    }
}

impl DockerBackupConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_backups == 0 {
            anyhow::bail!("docker_backup.max_backups must be at least 1");
        }
        // zip runs inside the staging directory, so relative paths resolve wrong
        for (field, path) in [
            ("source", &self.source),
            ("staging_dir", &self.staging_dir),
            ("compose_root", &self.compose_root),
        ] {
            if !path.is_absolute() {
                anyhow::bail!("docker_backup.{field} must be an absolute path");
            }
        }
        if self.staging_dir.parent().is_none_or(|p| p.as_os_str().is_empty()) {
            anyhow::bail!("docker_backup.staging_dir needs a parent directory for the archives");
        }
        if self.staging_dir.starts_with(&self.source) {
            anyhow::bail!("docker_backup.staging_dir cannot be inside the source");
        }
        Ok(())
    }

    pub fn to_job(&self) -> DockerBackupJob {
        DockerBackupJob {
            source: self.source.clone(),
            staging_dir: self.staging_dir.clone(),
            compose_root: self.compose_root.clone(),
            max_backups: self.max_backups,
            lock_release_wait: Duration::from_secs(self.lock_release_wait_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        AdminConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn test_save_and_load_json_config() {
        let mut config = AdminConfig::default();
        config.backup.max_backups = 9;
        config.installer.arch = Some(Arch::Aarch64);

        let file = NamedTempFile::new().expect("temp file");
        config.save_to_file(file.path()).expect("save");

        let loaded = AdminConfig::load_from_file(file.path()).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "backup": {{ "max_backups": 3 }} }}"#).expect("write");

        let loaded = AdminConfig::load_from_file(file.path()).expect("load");
        assert_eq!(loaded.backup.max_backups, 3);
        assert_eq!(loaded.backup.source, BackupConfig::default().source);
        assert_eq!(loaded.share, ShareConfig::default());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = AdminConfig::load_or_default("/nonexistent/dietpi-admin.json").expect("defaults");
        assert_eq!(config, AdminConfig::default());
    }

    #[test]
    fn test_load_invalid_json() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, "{{ not json").expect("write");
        assert!(AdminConfig::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_unknown_arch_rejected() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "installer": {{ "arch": "sparc" }} }}"#).expect("write");
        assert!(AdminConfig::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_validation_zero_retention() {
        let mut config = AdminConfig::default();
        config.backup.max_backups = 0;
        let err = config.validate().expect_err("zero retention");
        assert!(err.to_string().contains("max_backups"));
    }

    #[test]
    fn test_validation_destination_off_mount() {
        let mut config = AdminConfig::default();
        config.backup.destination = PathBuf::from("/srv/backups");
        assert!(config.validate().is_err());

        config.backup.mount_point = None;
        config.validate().expect("destination is its own mount point");
    }

    #[test]
    fn test_validation_bad_share() {
        let mut config = AdminConfig::default();
        config.share.share = "nas.local/backup".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_url_template_needs_version() {
        let mut config = AdminConfig::default();
        config.installer.url_template = "https://example.org/latest.deb".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_docker_paths_must_be_absolute() {
        let mut config = AdminConfig::default();
        config.docker_backup.source = PathBuf::from("config");
        config.docker_backup.staging_dir = PathBuf::from("out/temp");
        let err = config.validate().expect_err("relative paths");
        assert!(err.to_string().contains("absolute"), "{err}");

        config.docker_backup.source = PathBuf::from("/home/dietpi/config");
        let err = config.validate().expect_err("relative staging dir");
        assert!(err.to_string().contains("staging_dir"), "{err}");

        config.docker_backup.staging_dir = PathBuf::from("/mnt/nas/docker_config/temp");
        config.docker_backup.compose_root = PathBuf::from("docker");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backup_job_defaults_mount_point_to_destination() {
        let config = BackupConfig {
            mount_point: None,
            ..BackupConfig::default()
        };
        let job = config.to_job();
        assert_eq!(job.mount_point, config.destination);
    }

    #[test]
    fn test_installer_request_uses_configured_arch() {
        let config = InstallerConfig {
            arch: Some(Arch::Armv7),
            ..InstallerConfig::default()
        };
        let request = config.to_request(true).expect("request");
        assert_eq!(request.arch, Arch::Armv7);
        assert!(request.force);
    }
}
