use std::path::Path;

use anyhow::Result;
use clap::Args;

use crate::dispatch::TmuxDispatcher;
use crate::workflow::session::ensure_initialized;
use crate::workflow::{PROMPTS_DIR, workflow_dir};

#[derive(Debug, Args)]
pub struct UpArgs {
    /// Print the tmux commands instead of running them
    #[arg(long)]
    pub dry_run: bool,
}

impl UpArgs {
    pub fn execute(&self, root: &Path) -> Result<()> {
        ensure_initialized(root)?;
        let dispatcher = TmuxDispatcher::new(
            TmuxDispatcher::session_name_for(root),
            workflow_dir(root).join(PROMPTS_DIR),
        );

        if self.dry_run {
            let (_, commands) = dispatcher.bootstrap_commands(root, None);
            for args in commands {
                println!("tmux {}", args.join(" "));
            }
            return Ok(());
        }

        let created = dispatcher.ensure_session(root)?;
        if created.is_empty() {
            println!("tmux session {} already has every role window", dispatcher.session());
        } else {
            let names: Vec<&str> = created.iter().map(|r| r.as_str()).collect();
            println!("tmux session {}: created {}", dispatcher.session(), names.join(", "));
        }
        println!("  attach: tmux attach -t {}", dispatcher.session());
        Ok(())
    }
}
