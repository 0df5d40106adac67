use std::path::Path;

use clap::Args;
use serde::Serialize;

use super::OutputFormat;
use crate::workflow::iteration::MAX_ITERATIONS;
use crate::workflow::session::Snapshot;
use crate::workflow::signals::{DOMAIN_SIGNALS, REFINE_SIGNALS};
use crate::workflow::{Phase, ReviewOutcome, Session, TimelineEvent};

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub phase: Phase,
    /// Phase cached in state.json; differs from `phase` until the next refresh
    pub saved_phase: Phase,
    pub iteration: u32,
    pub max_iterations: u32,
    pub feature_name: Option<String>,
    pub branch_name: Option<String>,
    pub commit_count: u32,
    pub review: ReviewOutcome,
    pub signals: Vec<String>,
    pub next_step: &'static str,
    pub recent: Vec<TimelineEvent>,
}

impl StatusReport {
    pub fn from_snapshot(snapshot: Snapshot, recent: Vec<TimelineEvent>) -> Self {
        Self {
            phase: snapshot.phase,
            saved_phase: snapshot.state.phase,
            iteration: snapshot.state.iteration,
            max_iterations: MAX_ITERATIONS,
            feature_name: snapshot.state.feature_name,
            branch_name: snapshot.state.branch_name,
            commit_count: snapshot.state.commit_count,
            review: snapshot.review,
            signals: snapshot.signals.iter().map(str::to_string).collect(),
            next_step: snapshot.phase.next_step(),
            recent,
        }
    }

    fn has(&self, signal: &str) -> bool {
        self.signals.iter().any(|s| s == signal)
    }
}

impl StatusArgs {
    pub fn execute(&self, root: &Path) -> anyhow::Result<()> {
        let format = OutputFormat::resolve(self.format);
        let session = Session::open(root)?;
        let snapshot = session.snapshot();
        let recent = session.timeline_for(&snapshot.state).recent(5);
        let report = StatusReport::from_snapshot(snapshot, recent);

        match format {
            OutputFormat::Pretty => print_pretty(&report),
            OutputFormat::Text => print_text(&report),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        }
        Ok(())
    }
}

fn check(done: bool) -> &'static str {
    if done { "✓" } else { "·" }
}

fn print_pretty(report: &StatusReport) {
    println!("=== crewflow ===\n");
    println!(
        "Feature:   {}",
        report.feature_name.as_deref().unwrap_or("(none yet)")
    );
    println!(
        "Branch:    {}",
        report.branch_name.as_deref().unwrap_or("(unknown)")
    );
    println!("Phase:     {}", report.phase);
    println!(
        "Iteration: {}/{}",
        report.iteration, report.max_iterations
    );
    println!("Commits:   {}", report.commit_count);
    println!("Review:    {}", report.review);
    println!();

    println!("Workers:");
    for signal in DOMAIN_SIGNALS {
        println!("  {} {signal}", check(report.has(signal)));
    }
    if report.iteration > 1 || REFINE_SIGNALS.iter().any(|s| report.has(s)) {
        println!("Refine:");
        for signal in REFINE_SIGNALS {
            println!("  {} {signal}", check(report.has(signal)));
        }
    }

    if !report.recent.is_empty() {
        println!("\nRecent:");
        for event in &report.recent {
            println!(
                "  {}  {:<16} {}",
                event.timestamp.format("%H:%M:%S"),
                event.kind.as_str(),
                event.message
            );
        }
    }

    println!("\nNext: {}", report.next_step);
}

fn print_text(report: &StatusReport) {
    println!(
        "crewflow  phase={}  iteration={}/{}  review={}  commits={}",
        report.phase, report.iteration, report.max_iterations, report.review, report.commit_count
    );
    if let Some(feature) = &report.feature_name {
        println!("feature  {feature}");
    }
    if let Some(branch) = &report.branch_name {
        println!("branch  {branch}");
    }
    for signal in &report.signals {
        println!("signal  {signal}");
    }
    println!("next  {}", report.next_step);
}
