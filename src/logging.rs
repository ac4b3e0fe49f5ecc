//! Logging setup
//!
//! Status lines go to stderr and, when a log file is configured, are also
//! appended to it without ANSI colours. `RUST_LOG` wins over `-v`.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Default filter directive for a `-v` count.
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn build_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_for_verbosity(verbosity)))
}

/// Install the global subscriber. Safe to call once per process; later
/// calls are ignored.
pub fn init_logging(log_file: Option<&Path>, verbosity: u8) {
    let file_layer = log_file.and_then(|path| match open_log_file(path) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        ),
        Err(e) => {
            eprintln!("Cannot open log file {}: {e}; logging to stderr only", path.display());
            None
        }
    });

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let result = tracing_subscriber::registry()
        .with(build_filter(verbosity))
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    if result.is_err() {
        tracing::debug!("Logging already initialised");
    }
}

fn open_log_file(path: &Path) -> std::io::Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(level_for_verbosity(0), "info");
        assert_eq!(level_for_verbosity(1), "debug");
        assert_eq!(level_for_verbosity(5), "trace");
    }

    #[test]
    fn test_open_log_file_creates_parent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs/dietpi-admin.log");
        open_log_file(&path).expect("open");
        assert!(path.exists());
    }
}
