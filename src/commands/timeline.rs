use std::path::Path;

use anyhow::Result;
use clap::Args;

use super::OutputFormat;
use crate::workflow::timeline::TimelineSummary;
use crate::workflow::{Session, Timeline, TIMELINE_DIR};

#[derive(Debug, Args)]
pub struct TimelineArgs {
    /// Show only the last N events
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
    /// Print derived metrics instead of events
    #[arg(long)]
    pub summary: bool,
    /// Read another branch's log
    #[arg(long)]
    pub branch: Option<String>,
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

impl TimelineArgs {
    pub fn execute(&self, root: &Path) -> Result<()> {
        let session = Session::open(root)?;
        let timeline = match &self.branch {
            Some(branch) => Timeline::new(&session.dir().join(TIMELINE_DIR), branch),
            None => session.timeline(),
        };
        let format = OutputFormat::resolve(self.format);

        if self.summary {
            let summary = timeline.summary();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
                OutputFormat::Pretty | OutputFormat::Text => print_summary(&summary),
            }
            return Ok(());
        }

        let events = match self.limit {
            Some(n) => timeline.recent(n),
            None => timeline.events(),
        };
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&events)?),
            OutputFormat::Pretty => {
                if events.is_empty() {
                    println!("(no events)");
                }
                for event in &events {
                    println!(
                        "{}  {:<16} {}",
                        event.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
                        event.kind.as_str(),
                        event.message
                    );
                }
            }
            OutputFormat::Text => {
                for event in &events {
                    println!(
                        "{}  {}  {}",
                        event.timestamp.to_rfc3339(),
                        event.kind.as_str(),
                        event.message
                    );
                }
            }
        }
        Ok(())
    }
}

fn print_summary(summary: &TimelineSummary) {
    println!("events      {}", summary.total);
    println!("dispatches  {}", summary.dispatches);
    println!("errors      {}", summary.errors);
    if let Some(started) = summary.started_at {
        println!("started     {}", started.to_rfc3339());
    }
    if summary.total > 0 {
        let mins = summary.duration_secs / 60;
        let secs = summary.duration_secs % 60;
        println!("elapsed     {mins}m{secs:02}s");
    }
    for (kind, count) in &summary.by_kind {
        println!("  {:<16} {count}", kind.as_str());
    }
}
