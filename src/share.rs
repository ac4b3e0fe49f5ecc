//! CIFS share provisioning.
//!
//! Brings a network share to a usable state in one pass:
//!
//! 1. `mount.cifs` present (cifs-utils installed on demand)
//! 2. Server answers on the SMB port
//! 3. Credentials file written with mode 0600
//! 4. Mount point directory and fstab entry in place
//! 5. Mounted, with a fixed number of attempts and a fixed delay between them
//! 6. Writable, proven by creating and removing a probe file
//!
//! Each step is fatal on failure. Only step 5 retries.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command_runner::CommandRunner;
use crate::error::{AdminError, Result};
use crate::fstab::{self, CifsFstabEntry};
use crate::mounts::MountProbe;
use crate::sanity;
use crate::tools::mount::MountFromFstab;
use crate::tools::system::Dmesg;

/// Name of the file created and removed to prove the share is writable
pub const WRITE_TEST_FILE: &str = ".dietpi-admin-write-test";

/// Kernel log lines shown after the last failed attempt
const DIAGNOSTIC_LINES: usize = 20;

/// Username, password and domain for `mount.cifs`.
///
/// `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct CifsCredentials {
    username: String,
    password: String,
    domain: String,
}

impl CifsCredentials {
    pub fn new(username: &str, password: &str, domain: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            domain: domain.to_string(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Contents of a `credentials=` file.
    pub fn file_contents(&self) -> String {
        let mut out = format!("username={}\npassword={}\n", self.username, self.password);
        if !self.domain.is_empty() {
            out.push_str(&format!("domain={}\n", self.domain));
        }
        out
    }
}

impl fmt::Debug for CifsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CifsCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("domain", &self.domain)
            .finish()
    }
}

/// Everything needed to provision one share.
#[derive(Debug, Clone)]
pub struct ShareSpec {
    /// `//server/share`
    pub share: String,
    pub mount_point: PathBuf,
    pub credentials: CifsCredentials,
    pub credentials_path: PathBuf,
    pub fstab_path: PathBuf,
    pub uid: u32,
    pub gid: u32,
    pub smb_version: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub attempts: u32,
    pub retry_delay: Duration,
}

impl ShareSpec {
    pub fn fstab_entry(&self) -> CifsFstabEntry {
        CifsFstabEntry {
            share: self.share.clone(),
            mount_point: self.mount_point.clone(),
            credentials_path: self.credentials_path.clone(),
            uid: self.uid,
            gid: self.gid,
            smb_version: self.smb_version.clone(),
        }
    }
}

/// What `provision_share` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareReport {
    pub fstab_changed: bool,
    pub already_mounted: bool,
    /// Attempt that succeeded (0 when it was already mounted)
    pub mount_attempt: u32,
}

/// Host part of `//server/share`.
pub fn server_host(share: &str) -> Result<&str> {
    let rest = share
        .strip_prefix("//")
        .ok_or_else(|| AdminError::validation(format!("share '{share}' must start with //")))?;
    match rest.split_once('/') {
        Some((host, name)) if !host.is_empty() && !name.trim_matches('/').is_empty() => Ok(host),
        _ => Err(AdminError::validation(format!(
            "share '{share}' must look like //server/share"
        ))),
    }
}

/// TCP connect to the SMB port; any resolved address answering is enough.
pub fn check_reachable(host: &str, port: u16, timeout: Duration) -> Result<()> {
    let addrs: Vec<_> = (host, port)
        .to_socket_addrs()
        .map_err(|e| AdminError::MountUnreachable(format!("cannot resolve {host}: {e}")))?
        .collect();

    let mut last_error = None;
    for addr in &addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(_) => {
                tracing::debug!("{host}:{port} reachable via {addr}");
                return Ok(());
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(AdminError::MountUnreachable(match last_error {
        Some(e) => format!("{host}:{port}: {e}"),
        None => format!("{host} resolved to no addresses"),
    }))
}

/// Write the credentials file atomically with mode 0600.
///
/// The temp file is created 0600 from the start, so the password is never
/// readable by others, not even briefly.
pub fn write_credentials_file(path: &Path, credentials: &CifsCredentials) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut staged_name = path.file_name().unwrap_or_default().to_os_string();
    staged_name.push(".tmp");
    let staged = path.with_file_name(staged_name);

    let write = || -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&staged)?;
        // An existing temp file keeps its old mode; force it
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
        file.write_all(credentials.file_contents().as_bytes())?;
        file.sync_all()?;
        fs::rename(&staged, path)
    };

    write().map_err(|e| {
        let _ = fs::remove_file(&staged);
        AdminError::Io(e)
    })?;
    tracing::info!("Credentials written to {:?} (mode 600)", path);
    Ok(())
}

/// Kernel log lines mentioning cifs, newest last.
pub fn cifs_diagnostics(runner: &dyn CommandRunner) -> Vec<String> {
    match runner.run(&Dmesg) {
        Ok(output) if output.success => {
            let lines: Vec<String> = output
                .stdout
                .lines()
                .filter(|line| line.to_ascii_lowercase().contains("cifs"))
                .map(str::to_string)
                .collect();
            let skip = lines.len().saturating_sub(DIAGNOSTIC_LINES);
            lines.into_iter().skip(skip).collect()
        }
        Ok(output) => {
            tracing::warn!("dmesg failed: {}", output.failure_summary());
            Vec::new()
        }
        Err(e) => {
            tracing::warn!("dmesg unavailable: {e}");
            Vec::new()
        }
    }
}

/// Mount from fstab, retrying a fixed number of times.
///
/// An attempt only counts as successful if `mount` exits 0 AND the probe
/// then sees the mount point. Returns the successful attempt number.
pub fn mount_with_retry(
    spec: &ShareSpec,
    runner: &dyn CommandRunner,
    probe: &dyn MountProbe,
) -> Result<u32> {
    let mount = MountFromFstab {
        mount_point: spec.mount_point.clone(),
    };

    for attempt in 1..=spec.attempts {
        tracing::info!("Mounting {:?} (attempt {attempt}/{})", spec.mount_point, spec.attempts);
        let output = runner.run(&mount)?;

        if output.success && (output.dry_run || probe.is_mounted(&spec.mount_point)?) {
            tracing::info!("Mounted {} at {:?}", spec.share, spec.mount_point);
            return Ok(attempt);
        }

        if output.success {
            tracing::warn!("mount exited 0 but {:?} is not in the mount table", spec.mount_point);
        } else {
            tracing::warn!("mount attempt {attempt} failed: {}", output.failure_summary());
        }
        if attempt < spec.attempts {
            std::thread::sleep(spec.retry_delay);
        }
    }

    let diagnostics = cifs_diagnostics(runner);
    eprintln!("Kernel log (cifs):");
    for line in &diagnostics {
        eprintln!("  {line}");
        tracing::error!("kernel: {line}");
    }
    if diagnostics.is_empty() {
        eprintln!("  (no cifs messages in dmesg)");
    }

    Err(AdminError::MountFailed {
        mount_point: spec.mount_point.clone(),
        attempts: spec.attempts,
        diagnostics,
    })
}

/// Create then remove a probe file on the mounted share.
pub fn verify_writable(mount_point: &Path) -> Result<()> {
    let probe = mount_point.join(WRITE_TEST_FILE);
    let not_writable = |e: std::io::Error| AdminError::MountNotWritable {
        path: mount_point.to_path_buf(),
        reason: e.to_string(),
    };

    let mut file = fs::File::create(&probe).map_err(not_writable)?;
    file.write_all(b"dietpi-admin write test\n").map_err(not_writable)?;
    drop(file);
    fs::remove_file(&probe).map_err(not_writable)?;

    tracing::info!("Write test on {:?} passed", mount_point);
    Ok(())
}

/// Provision the share end to end.
pub fn provision_share(
    spec: &ShareSpec,
    runner: &dyn CommandRunner,
    probe: &dyn MountProbe,
) -> Result<ShareReport> {
    let dry_run = runner.is_dry_run();
    tracing::info!("Provisioning {} at {:?}", spec.share, spec.mount_point);

    sanity::ensure_binary(runner, "mount.cifs")?;

    let host = server_host(&spec.share)?;
    check_reachable(host, spec.port, spec.connect_timeout)?;

    if dry_run {
        tracing::info!("[DRY RUN] Would write credentials to {:?}", spec.credentials_path);
    } else {
        write_credentials_file(&spec.credentials_path, &spec.credentials)?;
        fs::create_dir_all(&spec.mount_point)?;
    }

    let fstab_changed = fstab::install_entry(&spec.fstab_path, &spec.fstab_entry(), dry_run)?;

    let already_mounted = probe.is_mounted(&spec.mount_point)?;
    let mount_attempt = if already_mounted {
        tracing::info!("{:?} is already mounted", spec.mount_point);
        0
    } else {
        mount_with_retry(spec, runner, probe)?
    };

    if dry_run {
        tracing::info!("[DRY RUN] Would run write test on {:?}", spec.mount_point);
    } else {
        verify_writable(&spec.mount_point)?;
    }

    Ok(ShareReport {
        fstab_changed,
        already_mounted,
        mount_attempt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_server_host() {
        assert_eq!(server_host("//nas.local/backup").expect("valid"), "nas.local");
        assert_eq!(server_host("//10.0.0.5/media/sub").expect("valid"), "10.0.0.5");
        assert!(server_host("nas.local/backup").is_err());
        assert!(server_host("//nas.local").is_err());
        assert!(server_host("//nas.local/").is_err());
        assert!(server_host("///backup").is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = CifsCredentials::new("dietpi", "hunter2", "WORKGROUP");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_credentials_file_contents() {
        let creds = CifsCredentials::new("dietpi", "p@ss word", "");
        assert_eq!(creds.file_contents(), "username=dietpi\npassword=p@ss word\n");
    }

    #[test]
    fn test_write_credentials_file_mode_600() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(".smbcredentials");
        let creds = CifsCredentials::new("dietpi", "secret", "WORKGROUP");

        write_credentials_file(&path, &creds).expect("write");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let content = fs::read_to_string(&path).expect("read");
        assert_eq!(content, "username=dietpi\npassword=secret\ndomain=WORKGROUP\n");
    }

    #[test]
    fn test_check_reachable_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        check_reachable("127.0.0.1", port, Duration::from_secs(1)).expect("reachable");
    }

    #[test]
    fn test_check_reachable_closed_port() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let err = check_reachable("127.0.0.1", port, Duration::from_secs(1)).expect_err("closed");
        assert!(matches!(err, AdminError::MountUnreachable(_)));
    }

    #[test]
    fn test_verify_writable() {
        let dir = tempfile::tempdir().expect("tempdir");
        verify_writable(dir.path()).expect("writable");
        assert!(!dir.path().join(WRITE_TEST_FILE).exists());
    }

    #[test]
    fn test_verify_writable_blocked_probe_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A directory where the probe file should go fails even for root
        fs::create_dir(dir.path().join(WRITE_TEST_FILE)).expect("mkdir");
        let err = verify_writable(dir.path()).expect_err("not writable");
        assert!(matches!(err, AdminError::MountNotWritable { .. }));
        assert_eq!(err.exit_code(), 1);
    }
}
