use std::path::Path;

use anyhow::Result;
use clap::Subcommand;

use super::OutputFormat;
use crate::workflow::Session;
use crate::workflow::signals::validate_signal_name;

#[derive(Debug, Subcommand)]
pub enum SignalCommand {
    /// Mark a signal as done (agents call this when they finish)
    Set {
        /// Signal name, e.g. `backend` or `tests-refine`
        name: String,
    },
    /// Remove a signal
    Clear {
        /// Signal name
        name: String,
    },
    /// List signals that are currently set
    List {
        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
}

impl SignalCommand {
    pub fn execute(&self, root: &Path) -> Result<()> {
        let session = Session::open(root)?;
        match self {
            Self::Set { name } => {
                validate_signal_name(name)?;
                let refreshed = session.mark(name)?;
                println!("set {name} (phase: {})", refreshed.state.phase);
            }
            Self::Clear { name } => {
                validate_signal_name(name)?;
                let refreshed = session.unmark(name)?;
                println!("cleared {name} (phase: {})", refreshed.state.phase);
            }
            Self::List { format } => {
                let signals = session.signals();
                match OutputFormat::resolve(*format) {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&signals)?),
                    OutputFormat::Pretty if signals.is_empty() => println!("(no signals set)"),
                    OutputFormat::Pretty | OutputFormat::Text => {
                        for name in signals.iter() {
                            println!("{name}");
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
