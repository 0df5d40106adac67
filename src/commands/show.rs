use std::io::IsTerminal;
use std::path::Path;

use anyhow::Result;
use clap::ValueEnum;

use crate::error::ExitError;
use crate::workflow::Session;
use crate::workflow::artifacts::Artifact;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ShowTarget {
    Plan,
    Review,
}

impl From<ShowTarget> for Artifact {
    fn from(target: ShowTarget) -> Self {
        match target {
            ShowTarget::Plan => Self::Plan,
            ShowTarget::Review => Self::Review,
        }
    }
}

/// Print the plan or review document; rendered as markdown on a terminal.
pub fn run_show(root: &Path, target: ShowTarget, raw: bool) -> Result<()> {
    let session = Session::open(root)?;
    let artifact = Artifact::from(target);
    let Some(text) = session.read_artifact(artifact) else {
        return Err(ExitError::Other(format!(
            "{} does not exist yet",
            session.artifact_path(artifact).display()
        ))
        .into());
    };

    if raw || !std::io::stdout().is_terminal() {
        print!("{text}");
        if !text.ends_with('\n') {
            println!();
        }
    } else {
        termimad::print_text(&text);
    }
    Ok(())
}
