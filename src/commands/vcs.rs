use std::path::Path;

use anyhow::Result;
use clap::Args;

use super::report_decision;
use crate::git::{CommitKind, commit_message};
use crate::workflow::Session;

#[derive(Debug, Args)]
pub struct CommitArgs {
    /// Conventional-commit type
    #[arg(value_enum)]
    pub kind: CommitKind,
    /// Commit subject
    pub message: String,
    /// Optional scope, e.g. `api`
    #[arg(long)]
    pub scope: Option<String>,
}

impl CommitArgs {
    pub fn execute(&self, root: &Path) -> Result<()> {
        let session = Session::open(root)?;
        session.commit(self.kind, &self.message, self.scope.as_deref())?;
        println!(
            "committed: {}",
            commit_message(self.kind, &self.message, self.scope.as_deref())
        );
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct PrArgs {
    /// Pull request title (defaults to the feature name)
    #[arg(long)]
    pub title: Option<String>,
}

impl PrArgs {
    pub fn execute(&self, root: &Path) -> Result<()> {
        let session = Session::open(root)?;
        let decision = session.create_pr(self.title.as_deref())?;
        report_decision("pr", &decision);
        Ok(())
    }
}
