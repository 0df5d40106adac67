//! Workflow core: signals, the phase engine, the refine loop policy and the
//! stores that persist a session.

pub mod artifacts;
pub mod iteration;
pub mod phase;
pub mod review;
pub mod role;
pub mod session;
pub mod signals;
pub mod state;
pub mod timeline;

use std::path::{Path, PathBuf};

/// Directory holding all workflow state, relative to the project root.
pub const WORKFLOW_DIR: &str = ".crewflow";
pub const SIGNALS_DIR: &str = "signals";
pub const STATE_FILE: &str = "state.json";
pub const SESSIONS_DIR: &str = "sessions";
pub const TIMELINE_DIR: &str = "timeline";
pub const PROMPTS_DIR: &str = "prompts";

pub fn workflow_dir(root: &Path) -> PathBuf {
    root.join(WORKFLOW_DIR)
}

pub use iteration::{Decision, MAX_ITERATIONS};
pub use phase::{Phase, determine_phase};
pub use review::{ReviewOutcome, classify_review};
pub use role::Role;
pub use session::Session;
pub use signals::{SignalSet, SignalStore};
pub use state::{StateStore, WorkflowState};
pub use timeline::{EventKind, Timeline, TimelineEvent};
