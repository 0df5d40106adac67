use std::path::Path;

use anyhow::Result;
use clap::Subcommand;

use super::OutputFormat;
use crate::config::{CONFIG_TOML, Config, global_config_path};
use crate::workflow::session::ensure_initialized;
use crate::workflow::workflow_dir;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the merged configuration (defaults < global < project)
    Show {
        /// Output format (pretty and text print TOML)
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Check both config layers and report where they live
    Validate,
}

impl ConfigCommand {
    pub fn execute(&self, root: &Path) -> Result<()> {
        ensure_initialized(root)?;
        let dir = workflow_dir(root);
        let config = Config::load_for(&dir)?;
        match self {
            Self::Show { format } => match OutputFormat::resolve(*format) {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
                OutputFormat::Pretty | OutputFormat::Text => print!("{}", config.to_toml()?),
            },
            Self::Validate => {
                let project = dir.join(CONFIG_TOML);
                for (label, path) in [("global", global_config_path()), ("project", Some(project))] {
                    match path {
                        Some(path) if path.exists() => println!("{label:<8} {}  ok", path.display()),
                        Some(path) => println!("{label:<8} {}  (absent)", path.display()),
                        None => println!("{label:<8} (no config directory)"),
                    }
                }
                println!("config valid");
            }
        }
        Ok(())
    }
}
