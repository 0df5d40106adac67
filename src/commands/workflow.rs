use std::path::Path;

use anyhow::Result;
use clap::Args;

use super::report_decision;
use crate::dispatch::PrintDispatcher;
use crate::workflow::session::ensure_initialized;
use crate::workflow::{Decision, Session};

#[derive(Debug, Clone, Copy)]
pub enum Transition {
    Implement,
    Review,
    Refine,
    ReReview,
    Compound,
}

impl Transition {
    const fn action(self) -> &'static str {
        match self {
            Self::Implement => "implement",
            Self::Review => "review",
            Self::Refine => "refine",
            Self::ReReview => "rereview",
            Self::Compound => "compound",
        }
    }

    fn apply(self, session: &Session) -> Result<Decision> {
        match self {
            Self::Implement => session.start_implementing(),
            Self::Review => session.start_review(),
            Self::Refine => session.refine(),
            Self::ReReview => session.re_review(),
            Self::Compound => session.compound(),
        }
    }
}

#[derive(Debug, Args)]
pub struct DispatchArgs {
    /// Print prompts to stdout instead of sending them to tmux
    #[arg(long)]
    pub dry_run: bool,
}

impl DispatchArgs {
    fn session(&self, root: &Path) -> Result<Session> {
        ensure_initialized(root)?;
        let builder = Session::builder(root);
        if self.dry_run {
            builder.dispatcher(PrintDispatcher).build()
        } else {
            builder.build()
        }
    }

    pub fn execute(&self, root: &Path, transition: Transition) -> Result<()> {
        let session = self.session(root)?;
        let decision = transition.apply(&session)?;
        report_decision(transition.action(), &decision);
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// What to build, in plain words
    pub description: Vec<String>,
    #[command(flatten)]
    pub dispatch: DispatchArgs,
}

impl PlanArgs {
    pub fn execute(&self, root: &Path) -> Result<()> {
        let description = self.description.join(" ");
        if description.trim().is_empty() {
            anyhow::bail!("plan needs a feature description");
        }
        let session = self.dispatch.session(root)?;
        let decision = session.start_planning(&description)?;
        report_decision("plan", &decision);
        Ok(())
    }
}

/// Re-read signals and artifacts and persist the recomputed phase.
pub fn run_refresh(root: &Path) -> Result<()> {
    let session = Session::open(root)?;
    let refreshed = session.refresh()?;
    if refreshed.changed() {
        println!("phase: {} -> {}", refreshed.previous, refreshed.state.phase);
    } else {
        println!("phase: {}", refreshed.state.phase);
    }
    Ok(())
}
