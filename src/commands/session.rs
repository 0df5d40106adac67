use std::path::Path;

use anyhow::Result;
use clap::Subcommand;

use crate::error::ExitError;
use crate::workflow::Session;

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Park the current workflow under a branch name
    Save {
        /// Branch to save under (defaults to the workflow's branch)
        branch: Option<String>,
    },
    /// Restore a parked workflow, replacing the live signals
    Load {
        branch: String,
    },
    /// List parked workflows
    List,
    /// Delete a parked workflow
    Delete {
        branch: String,
    },
}

impl SessionCommand {
    pub fn execute(&self, root: &Path) -> Result<()> {
        let session = Session::open(root)?;
        match self {
            Self::Save { branch } => {
                let saved = session.save_branch_session(branch.as_deref())?;
                println!("saved session for {saved}");
            }
            Self::Load { branch } => match session.load_branch_session(branch)? {
                Some(state) => println!(
                    "loaded session for {branch} (phase: {}, iteration {})",
                    state.phase, state.iteration
                ),
                None => {
                    return Err(ExitError::Other(format!("no saved session for {branch}")).into());
                }
            },
            Self::List => {
                let branches = session.list_branch_sessions();
                if branches.is_empty() {
                    println!("(no saved sessions)");
                }
                for branch in branches {
                    println!("{branch}");
                }
            }
            Self::Delete { branch } => {
                if session.delete_branch_session(branch)? {
                    println!("deleted session for {branch}");
                } else {
                    return Err(ExitError::Other(format!("no saved session for {branch}")).into());
                }
            }
        }
        Ok(())
    }
}
