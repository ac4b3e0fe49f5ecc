//! Type-safe configuration values
//!
//! Enumerated settings are real enums so a typo in the config file fails at
//! load time instead of producing a bad download URL.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// CPU architecture of the remote-desktop package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum Arch {
    #[default]
    #[strum(serialize = "x86_64")]
    #[serde(rename = "x86_64")]
    X86_64,
    #[strum(serialize = "aarch64")]
    #[serde(rename = "aarch64")]
    Aarch64,
    #[strum(serialize = "armv7")]
    #[serde(rename = "armv7")]
    Armv7,
}

impl Arch {
    /// Architecture of the running binary, if it is one we ship packages for.
    pub fn host() -> Option<Self> {
        match std::env::consts::ARCH {
            "x86_64" => Some(Arch::X86_64),
            "aarch64" => Some(Arch::Aarch64),
            "arm" => Some(Arch::Armv7),
            _ => None,
        }
    }
}
