//! Child process supervision for external tools
//!
//! `zip`, `mount` or `apt-get` must not outlive dietpi-admin. If the tool is
//! interrupted halfway through a backup or mount, the orphaned child would
//! keep writing to the share or holding the dpkg lock.
//!
//! - Children run in their own process group with `PR_SET_PDEATHSIG`
//! - Every running child PID is tracked in a global registry
//! - Scratch paths (staging directories, `.partial` copies) are tracked too
//! - SIGINT/SIGTERM/SIGHUP terminate all registered groups, remove the
//!   scratch paths, then exit 128+n. `exit` skips destructors, so RAII
//!   cleanup alone would leave them behind.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Registry of child process groups that are still running
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
    /// Files and directories to delete if we are killed mid-run
    scratch: HashSet<PathBuf>,
    /// Set once termination started, so a second signal does not race the first
    terminating: bool,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        tracing::debug!(pid, "registered child process");
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        tracing::debug!(pid, "unregistered child process");
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    pub fn register_scratch(&mut self, path: PathBuf) {
        tracing::debug!("registered scratch path {:?}", path);
        self.scratch.insert(path);
    }

    pub fn unregister_scratch(&mut self, path: &Path) {
        self.scratch.remove(path);
    }

    pub fn scratch_count(&self) -> usize {
        self.scratch.len()
    }

    /// Delete every registered scratch path. Missing paths are fine.
    pub fn remove_scratch(&mut self) {
        for path in self.scratch.drain() {
            let removed = match fs::symlink_metadata(&path) {
                Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path),
                Ok(_) => fs::remove_file(&path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            };
            match removed {
                Ok(()) => tracing::info!("Removed {:?}", path),
                Err(e) => tracing::warn!("Could not remove {:?}: {e}", path),
            }
        }
    }

    /// SIGTERM every tracked process group, wait up to `grace_period`,
    /// then SIGKILL whatever is left.
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.terminating {
            return;
        }
        self.terminating = true;

        if self.pids.is_empty() {
            return;
        }

        tracing::info!("Terminating {} child process group(s)", self.pids.len());

        let pids: Vec<u32> = self.pids.iter().copied().collect();
        for &pid in &pids {
            if let Err(e) = signal_group(pid, Signal::SIGTERM) {
                tracing::warn!(pid, "SIGTERM to process group failed: {e}");
                let _ = signal_pid(pid, Signal::SIGTERM);
            }
        }

        let start = Instant::now();
        while start.elapsed() < grace_period {
            if pids.iter().all(|&pid| !is_process_alive(pid)) {
                tracing::info!("All child processes exited");
                self.pids.clear();
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in &pids {
            if is_process_alive(pid) {
                tracing::warn!(pid, "Child ignored SIGTERM, sending SIGKILL");
                if signal_group(pid, Signal::SIGKILL).is_err() {
                    let _ = signal_pid(pid, Signal::SIGKILL);
                }
            }
        }
        self.pids.clear();
    }
}

/// Keeps a child PID in the global registry for as long as it lives.
pub struct ChildGuard {
    pid: u32,
}

impl ChildGuard {
    pub fn register(pid: u32) -> Self {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid);
        }
        Self { pid }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(self.pid);
        }
    }
}

/// Keeps a scratch path registered until dropped. The path itself is not
/// touched on drop; its owner cleans up on the normal exit paths.
pub struct ScratchGuard {
    path: PathBuf,
}

impl ScratchGuard {
    pub fn register(path: &Path) -> Self {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register_scratch(path.to_path_buf());
        }
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister_scratch(&self.path);
        }
    }
}

fn signal_pid(pid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), signal)
}

/// Negative PID addresses the whole group, so `zip` spawned by a shell or
/// `mount.cifs` spawned by `mount` is reached too.
fn signal_group(pgid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), signal)
}

/// Alive means the PID exists and is not a zombie.
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // Field 3 is the state; skip past the parenthesised command name
        if let Some(rest) = stat.rsplit(')').next() {
            if let Some(state) = rest.split_whitespace().next() {
                return !matches!(state, "Z" | "X");
            }
        }
    }
    true
}

/// Install the SIGINT/SIGTERM/SIGHUP handler thread.
///
/// Call once at program start.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            tracing::warn!("Received signal {sig}, stopping child processes");
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(Duration::from_secs(3));
                registry.remove_scratch();
            }
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Run the command as leader of a new process group that dies with us
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: the closure only calls async-signal-safe setpgid and prctl
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::from)?;
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}
