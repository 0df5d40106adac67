pub mod config;
pub mod init;
pub mod reset;
pub mod schema;
pub mod session;
pub mod show;
pub mod signal;
pub mod status;
pub mod timeline;
pub mod up;
pub mod vcs;
pub mod watch;
pub mod workflow;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::workflow::{Decision, MAX_ITERATIONS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Text,
    Json,
}

impl OutputFormat {
    /// Pretty on a terminal, plain text when piped.
    pub fn resolve(format: Option<Self>) -> Self {
        format.unwrap_or_else(|| {
            if std::io::stdout().is_terminal() {
                Self::Pretty
            } else {
                Self::Text
            }
        })
    }
}

/// `--project-root`, or the current directory.
pub fn project_root(root: Option<&Path>) -> anyhow::Result<PathBuf> {
    match root {
        Some(root) => Ok(root.to_path_buf()),
        None => Ok(std::env::current_dir()?),
    }
}

/// Print the outcome of a gated transition. A refusal leaves the workflow
/// untouched and is advisory, so it does not fail the command.
pub fn report_decision(action: &str, decision: &Decision) {
    if decision.advance {
        println!("{action}: {}", decision.reason);
    } else if decision.is_escalation() {
        println!("{action} refused: {}", decision.reason);
        eprintln!("warning: {MAX_ITERATIONS} review rounds failed; a human needs to take over");
    } else {
        println!("{action} refused: {}", decision.reason);
    }
}
