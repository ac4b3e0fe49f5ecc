//! Shared fixtures for integration tests
//!
//! `FakeRunner` answers tool invocations from a closure and records every
//! call, so pipelines can be driven end to end without touching the host.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use dietpi_admin::command_runner::{CommandOutput, CommandRunner};
use dietpi_admin::mounts::MountProbe;
use dietpi_admin::sanity::package_for_binary;
use dietpi_admin::tools::ToolCommand;

/// One recorded tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

type Handler = Box<dyn Fn(&Invocation) -> CommandOutput>;

pub struct FakeRunner {
    binaries: RefCell<HashSet<String>>,
    handler: Handler,
    calls: RefCell<Vec<Invocation>>,
    dry_run: bool,
}

/// Binaries a healthy DietPi image has.
pub const ALL_BINARIES: &[&str] = &[
    "apt-get",
    "dpkg-query",
    "wget",
    "zip",
    "mount",
    "mount.cifs",
    "dmesg",
    "docker",
];

impl FakeRunner {
    /// Every command succeeds with empty output.
    pub fn new() -> Self {
        Self::with_handler(|_| CommandOutput::ok(""))
    }

    pub fn with_handler(handler: impl Fn(&Invocation) -> CommandOutput + 'static) -> Self {
        Self {
            binaries: RefCell::new(ALL_BINARIES.iter().map(|b| b.to_string()).collect()),
            handler: Box::new(handler),
            calls: RefCell::new(Vec::new()),
            dry_run: false,
        }
    }

    pub fn without_binary(self, binary: &str) -> Self {
        self.binaries.borrow_mut().remove(binary);
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.program == program)
            .cloned()
            .collect()
    }

    /// A successful `apt-get install` makes the binaries its packages provide appear.
    fn record_install(&self, invocation: &Invocation) {
        let mut binaries = self.binaries.borrow_mut();
        for binary in ALL_BINARIES {
            if let Some(package) = package_for_binary(binary) {
                if invocation.args.iter().any(|a| a == package) {
                    binaries.insert(binary.to_string());
                }
            }
        }
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, command: &dyn ToolCommand) -> dietpi_admin::Result<CommandOutput> {
        let invocation = Invocation {
            program: command.program().to_string(),
            args: command.to_cli_args(),
            working_dir: command.working_dir().map(Path::to_path_buf),
        };
        self.calls.borrow_mut().push(invocation.clone());

        if self.dry_run && command.is_destructive() {
            return Ok(CommandOutput {
                exit_code: Some(0),
                success: true,
                dry_run: true,
                ..CommandOutput::default()
            });
        }

        let output = (self.handler)(&invocation);
        if invocation.program == "apt-get" && output.success {
            self.record_install(&invocation);
        }
        Ok(output)
    }

    fn binary_exists(&self, binary: &str) -> bool {
        self.binaries.borrow().contains(binary)
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Mount probe with a fixed answer.
pub struct StaticProbe(pub bool);

impl MountProbe for StaticProbe {
    fn is_mounted(&self, _path: &Path) -> dietpi_admin::Result<bool> {
        Ok(self.0)
    }
}

/// Mount probe whose answer the test (or a runner handler) can flip.
#[derive(Clone, Default)]
pub struct SharedProbe(pub Rc<Cell<bool>>);

impl SharedProbe {
    pub fn set(&self, mounted: bool) {
        self.0.set(mounted);
    }
}

impl MountProbe for SharedProbe {
    fn is_mounted(&self, _path: &Path) -> dietpi_admin::Result<bool> {
        Ok(self.0.get())
    }
}

/// Handler helper: `zip -r -q -y <archive> .` leaves a small file at `<archive>`.
pub fn fake_zip(invocation: &Invocation) -> CommandOutput {
    let archive = &invocation.args[3];
    match std::fs::write(archive, b"PK\x05\x06fake") {
        Ok(()) => CommandOutput::ok(""),
        Err(e) => CommandOutput::failed(15, format!("zip I/O error: {e}")),
    }
}
