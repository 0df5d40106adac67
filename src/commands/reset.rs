use std::io::IsTerminal;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use crate::workflow::Session;

#[derive(Debug, Args)]
pub struct ResetArgs {
    /// Skip the confirmation prompt
    #[arg(long, short)]
    pub yes: bool,
}

impl ResetArgs {
    pub fn execute(&self, root: &Path) -> Result<()> {
        let session = Session::open(root)?;
        let state = session.state();

        if !self.yes {
            if !std::io::stdin().is_terminal() {
                anyhow::bail!("reset discards signals, plan and review; pass --yes to confirm");
            }
            let prompt = format!(
                "Discard the {} workflow for {}?",
                state.phase,
                state.feature_name.as_deref().unwrap_or("this project")
            );
            if !prompt_confirm(&prompt, false)? {
                println!("reset cancelled");
                return Ok(());
            }
        }

        let state = session.reset()?;
        println!("workflow reset (phase: {})", state.phase);
        Ok(())
    }
}

fn prompt_confirm(prompt: &str, default: bool) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()
        .context("reading user confirmation")
}
