use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use crate::config::{CONFIG_TOML, Config};
use crate::detect::detect_project;
use crate::workflow::{Session, workflow_dir};

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Feature name to record before a plan exists
    #[arg(long)]
    pub feature: Option<String>,
    /// Rewrite config.toml even if it already exists
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn execute(&self, root: &Path) -> Result<()> {
        let dir = workflow_dir(root);
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

        let config_path = dir.join(CONFIG_TOML);
        if self.force || !config_path.exists() {
            let detection = detect_project(root);
            let config = Config {
                commands: detection.commands,
                ..Config::default()
            };
            fs::write(&config_path, config.to_toml()?)
                .with_context(|| format!("writing {}", config_path.display()))?;
            tracing::info!(framework = detection.framework, "wrote {}", config_path.display());
            println!("Detected project: {}", detection.framework);
        }

        let session = Session::builder(root).build()?;
        let state = session.init(self.feature.as_deref())?;

        println!("Workflow ready in {}", dir.display());
        println!("  phase:  {}", state.phase);
        if let Some(branch) = &state.branch_name {
            println!("  branch: {branch}");
        }
        println!("  next:   {}", state.phase.next_step());
        println!("  agents: crewflow up");
        Ok(())
    }
}
