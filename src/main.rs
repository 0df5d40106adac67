use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crewflow::commands::config::ConfigCommand;
use crewflow::commands::init::InitArgs;
use crewflow::commands::reset::ResetArgs;
use crewflow::commands::session::SessionCommand;
use crewflow::commands::show::ShowTarget;
use crewflow::commands::signal::SignalCommand;
use crewflow::commands::status::StatusArgs;
use crewflow::commands::timeline::TimelineArgs;
use crewflow::commands::up::UpArgs;
use crewflow::commands::vcs::{CommitArgs, PrArgs};
use crewflow::commands::watch::WatchArgs;
use crewflow::commands::workflow::{DispatchArgs, PlanArgs, Transition};
use crewflow::{commands, error, telemetry};

#[derive(Debug, Parser)]
#[command(
    name = "crewflow",
    version,
    about = "Coordinate planner, worker and reviewer agents through a phase-driven workflow"
)]
struct Cli {
    /// Project root directory (defaults to the current directory)
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create .crewflow/ and start a workflow
    Init(InitArgs),
    /// Start the tmux session with one window per agent role
    Up(UpArgs),
    /// Show the current phase, signals and recent events
    Status(StatusArgs),
    /// Recompute the phase from signals and save it
    Refresh,
    /// Keep refreshing until interrupted
    Watch(WatchArgs),
    /// Ask the planner to write a plan
    Plan(PlanArgs),
    /// Dispatch the backend, frontend and tests workers
    Implement(DispatchArgs),
    /// Dispatch the reviewer
    Review(DispatchArgs),
    /// Start a refine round after a failed review
    Refine(DispatchArgs),
    /// Send refined work back to the reviewer
    Rereview(DispatchArgs),
    /// Capture learnings after a passing review
    Compound(DispatchArgs),
    /// Commit the working tree with a conventional message
    Commit(CommitArgs),
    /// Push the branch and open a pull request
    Pr(PrArgs),
    /// Discard signals, plan and review and start over
    Reset(ResetArgs),
    /// Set, clear or list completion signals
    Signal {
        #[command(subcommand)]
        command: SignalCommand,
    },
    /// Save and restore per-branch workflows
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
    /// Show the event log for the current branch
    Timeline(TimelineArgs),
    /// Print the plan or review document
    Show {
        #[arg(value_enum)]
        target: ShowTarget,
        /// Print markdown source instead of rendering it
        #[arg(long)]
        raw: bool,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Print the JSON Schema for .crewflow/config.toml
    Schema,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::Up(_) => "up",
            Self::Status(_) => "status",
            Self::Refresh => "refresh",
            Self::Watch(_) => "watch",
            Self::Plan(_) => "plan",
            Self::Implement(_) => "implement",
            Self::Review(_) => "review",
            Self::Refine(_) => "refine",
            Self::Rereview(_) => "rereview",
            Self::Compound(_) => "compound",
            Self::Commit(_) => "commit",
            Self::Pr(_) => "pr",
            Self::Reset(_) => "reset",
            Self::Signal { .. } => "signal",
            Self::Session { .. } => "session",
            Self::Timeline(_) => "timeline",
            Self::Show { .. } => "show",
            Self::Config { .. } => "config",
            Self::Schema => "schema",
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let root = commands::project_root(cli.project_root.as_deref())?;
    match cli.command {
        Commands::Init(args) => args.execute(&root),
        Commands::Up(args) => args.execute(&root),
        Commands::Status(args) => args.execute(&root),
        Commands::Refresh => commands::workflow::run_refresh(&root),
        Commands::Watch(args) => args.execute(&root),
        Commands::Plan(args) => args.execute(&root),
        Commands::Implement(args) => args.execute(&root, Transition::Implement),
        Commands::Review(args) => args.execute(&root, Transition::Review),
        Commands::Refine(args) => args.execute(&root, Transition::Refine),
        Commands::Rereview(args) => args.execute(&root, Transition::ReReview),
        Commands::Compound(args) => args.execute(&root, Transition::Compound),
        Commands::Commit(args) => args.execute(&root),
        Commands::Pr(args) => args.execute(&root),
        Commands::Reset(args) => args.execute(&root),
        Commands::Signal { command } => command.execute(&root),
        Commands::Session { command } => command.execute(&root),
        Commands::Timeline(args) => args.execute(&root),
        Commands::Show { target, raw } => commands::show::run_show(&root, target, raw),
        Commands::Config { command } => command.execute(&root),
        Commands::Schema => commands::schema::run_schema(),
    }
}

fn main() -> ExitCode {
    let _telemetry = telemetry::init();

    let cli = Cli::parse();

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(exit_err) = e.downcast_ref::<error::ExitError>() {
                eprintln!("error: {exit_err}");
                exit_err.exit_code()
            } else {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        }
    }
}
