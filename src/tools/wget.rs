use std::path::PathBuf;

use super::ToolCommand;

/// `wget -q -O <output> <url>`
#[derive(Debug, Clone)]
pub struct Wget {
    pub url: String,
    pub output: PathBuf,
}

impl ToolCommand for Wget {
    fn program(&self) -> &'static str {
        "wget"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-q".to_string(),
            "-O".to_string(),
            self.output.display().to_string(),
            self.url.clone(),
        ]
    }
}
