use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use crate::config::MIN_POLL_INTERVAL_MS;
use crate::workflow::session::Refresh;
use crate::workflow::{Phase, Session};

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Poll interval in milliseconds (defaults to dashboard.poll_interval_ms)
    #[arg(long)]
    pub interval_ms: Option<u64>,
    /// Stop once the workflow reaches this phase
    #[arg(long)]
    pub until: Option<Phase>,
}

impl WatchArgs {
    pub fn execute(&self, root: &Path) -> Result<()> {
        let session = Session::open(root)?;
        let interval = self
            .interval_ms
            .unwrap_or(session.config().dashboard.poll_interval_ms)
            .max(MIN_POLL_INTERVAL_MS);

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
            .context("installing Ctrl-C handler")?;

        let first = session.refresh()?;
        println!("[{}] phase: {}", stamp(), first.state.phase);
        tracing::info!(interval_ms = interval, "watching signals");

        while running.load(Ordering::SeqCst) {
            if self.until == Some(session.state().phase) {
                break;
            }
            std::thread::sleep(Duration::from_millis(interval));
            let Some(refreshed) = poll(&session) else {
                continue;
            };
            if refreshed.changed() {
                println!(
                    "[{}] phase: {} -> {}  ({})",
                    stamp(),
                    refreshed.previous,
                    refreshed.state.phase,
                    refreshed.state.phase.next_step()
                );
            }
        }
        Ok(())
    }
}

/// One refresh. Failures are transient (an agent mid-write, a full disk)
/// and only skip this tick.
fn poll(session: &Session) -> Option<Refresh> {
    match session.refresh() {
        Ok(refreshed) => Some(refreshed),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "refresh failed, retrying on next poll");
            None
        }
    }
}

fn stamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dispatch::MemoryDispatcher;
    use crate::git::MemoryVcs;
    use crate::workflow::artifacts::MemoryArtifacts;
    use crate::workflow::signals::{self, MemorySignals};
    use crate::workflow::{STATE_FILE, workflow_dir};

    #[test]
    fn poll_survives_a_failed_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::builder(dir.path())
            .config(Config::default())
            .signals(MemorySignals::with(&[signals::PLAN]))
            .artifacts(MemoryArtifacts::new())
            .dispatcher(MemoryDispatcher::new())
            .vcs(MemoryVcs::on_branch("main"))
            .build()
            .unwrap();

        // A directory where state.json belongs makes the save fail.
        let state_path = workflow_dir(dir.path()).join(STATE_FILE);
        std::fs::create_dir_all(&state_path).unwrap();
        assert!(poll(&session).is_none());

        std::fs::remove_dir(&state_path).unwrap();
        let refreshed = poll(&session).unwrap();
        assert_eq!(refreshed.state.phase, Phase::Implementing);
    }
}
