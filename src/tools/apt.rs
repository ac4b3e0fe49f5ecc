//! Debian package management: `apt-get install` and `dpkg-query`.

use std::path::PathBuf;

use super::ToolCommand;

/// What `apt-get install` should install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AptTarget {
    /// Packages from the configured repositories.
    Packages(Vec<String>),
    /// A downloaded `.deb` file. apt resolves its dependencies.
    LocalDeb(PathBuf),
}

/// `apt-get install -y <target>` run non-interactively.
#[derive(Debug, Clone)]
pub struct AptInstall {
    pub target: AptTarget,
}

impl AptInstall {
    pub fn packages<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target: AptTarget::Packages(packages.into_iter().map(Into::into).collect()),
        }
    }

    pub fn local_deb(path: impl Into<PathBuf>) -> Self {
        Self {
            target: AptTarget::LocalDeb(path.into()),
        }
    }
}

impl ToolCommand for AptInstall {
    fn program(&self) -> &'static str {
        "apt-get"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec!["install".to_string(), "-y".to_string()];
        match &self.target {
            AptTarget::Packages(packages) => args.extend(packages.iter().cloned()),
            AptTarget::LocalDeb(path) => {
                // apt only treats the argument as a file when it contains a slash
                if path.is_absolute() || path.starts_with(".") {
                    args.push(path.display().to_string());
                } else {
                    args.push(format!("./{}", path.display()));
                }
            }
        }
        args
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        vec![("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string())]
    }
}

/// `dpkg-query -W --showformat=${Version} <package>`: prints the installed version,
/// exits non-zero when the package is unknown.
#[derive(Debug, Clone)]
pub struct DpkgQueryVersion {
    pub package: String,
}

impl ToolCommand for DpkgQueryVersion {
    fn program(&self) -> &'static str {
        "dpkg-query"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-W".to_string(),
            "--showformat=${Version}".to_string(),
            self.package.clone(),
        ]
    }

    fn is_destructive(&self) -> bool {
        false
    }
}
