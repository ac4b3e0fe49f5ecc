//! Read-only host probes.

use super::ToolCommand;

/// `which <binary>`: exit status tells whether the binary is on `PATH`.
#[derive(Debug, Clone)]
pub struct Which {
    pub binary: String,
}

impl Which {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl ToolCommand for Which {
    fn program(&self) -> &'static str {
        "which"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![self.binary.clone()]
    }

    fn is_destructive(&self) -> bool {
        false
    }
}

/// `dmesg`: kernel ring buffer, used for mount diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Dmesg;

impl ToolCommand for Dmesg {
    fn program(&self) -> &'static str {
        "dmesg"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![]
    }

    fn is_destructive(&self) -> bool {
        false
    }
}
