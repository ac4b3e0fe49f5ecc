//! dietpi-admin - Main entry point
//!
//! Parses the command line, loads the configuration and runs one
//! subcommand. Every failure is logged and turned into exit code 1.

use std::process::ExitCode;

use anyhow::Context;
use tracing::{debug, error, info};

use dietpi_admin::cli::{Cli, Commands};
use dietpi_admin::config_file::AdminConfig;
use dietpi_admin::{
    AdminError, InstallOutcome, ProcMounts, SystemRunner, install_remote_desktop, logging,
    process_guard, provision_share, run_backup, run_docker_backup, sanity,
};

/// Main application entry point
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Config first: it names the log file
    let loaded = AdminConfig::load_or_default(&cli.config);
    let log_file = cli
        .log_file
        .clone()
        .or_else(|| loaded.as_ref().ok().map(|c| c.log_file.clone()))
        .unwrap_or_else(|| AdminConfig::default().log_file);
    logging::init_logging(Some(&log_file), cli.verbose);
    info!("dietpi-admin {} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = process_guard::init_signal_handlers() {
        tracing::warn!("Failed to initialize signal handlers: {}", e);
    }
    debug!("Signal handlers initialized");

    let result = match loaded {
        Ok(mut config) => {
            cli.apply_overrides(&mut config);
            run(&cli, config)
        }
        // These read or write their own file; a broken default config must not block them
        Err(e) if matches!(cli.command, Commands::Validate { .. } | Commands::InitConfig { .. }) => {
            debug!("Ignoring unreadable {:?}: {e:#}", cli.config);
            run(&cli, AdminConfig::default())
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("✗ {e:#}");
            let code = e
                .downcast_ref::<AdminError>()
                .map(AdminError::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: &Cli, config: AdminConfig) -> anyhow::Result<()> {
    let runner = SystemRunner::new(cli.dry_run);
    if cli.dry_run {
        info!("Dry-run mode: destructive operations will be skipped");
    }

    match &cli.command {
        Commands::InstallRemoteDesktop(args) => {
            sanity::require_root("install-remote-desktop")?;
            config.installer.validate()?;
            let request = config.installer.to_request(args.force)?;
            match install_remote_desktop(&request, &runner)? {
                InstallOutcome::Installed { version } => {
                    println!("✓ {} {version} installed", request.package);
                }
                InstallOutcome::AlreadyInstalled { version } => {
                    println!("✓ {} {version} already installed", request.package);
                }
            }
        }
        Commands::MountShare(_) => {
            sanity::require_root("mount-share")?;
            let spec = config.share.to_spec()?;
            let report = provision_share(&spec, &runner, &ProcMounts::new())?;
            if report.already_mounted {
                println!("✓ {} already mounted at {:?}", spec.share, spec.mount_point);
            } else {
                println!("✓ {} mounted at {:?}", spec.share, spec.mount_point);
            }
        }
        Commands::Backup(_) => {
            config.backup.validate()?;
            let job = config.backup.to_job();
            let today = chrono::Local::now().date_naive();
            let report = run_backup(&job, today, &runner, &ProcMounts::new())?;
            println!("✓ Archive {:?} ({} retained)", report.archive, report.retained);
            if let Some(evicted) = report.evicted {
                println!("  evicted {:?}", evicted);
            }
        }
        Commands::DockerBackup(_) => {
            config.docker_backup.validate()?;
            let job = config.docker_backup.to_job();
            let now = chrono::Local::now().naive_local();
            let report = run_docker_backup(&job, now, &runner)?;
            println!(
                "✓ {} service folders copied, {} failed",
                report.copied.len(),
                report.failed.len()
            );
            if let Some(archive) = report.archive {
                println!("  archive {:?}", archive);
            }
        }
        Commands::Validate { path } => {
            info!("Validating configuration file: {:?}", path);
            let config = AdminConfig::load_from_file(path)?;
            config
                .validate()
                .with_context(|| format!("{:?} is not valid", path))?;
            println!("✓ Configuration file is valid: {:?}", path);
        }
        Commands::InitConfig { path } => {
            if path.exists() {
                anyhow::bail!("{:?} already exists; not overwriting", path);
            }
            AdminConfig::default().save_to_file(path)?;
            println!("✓ Default configuration written to {:?}", path);
        }
    }

    Ok(())
}
