//! Teamflow - interactive team development workflow for Git and GitHub.
//!
//! The CLI surface is small on purpose: five positional subcommands and
//! three maintenance flags. Everything else happens through prompts.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use teamflow::{App, Phase, StdinPrompter};

/// Interactive team development workflow for Git and GitHub
#[derive(Parser)]
#[command(name = "teamflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Option<Commands>,

    /// Validate configuration, print a report, and exit
    #[arg(long)]
    check_config: bool,

    /// Interactive first-time setup, then exit
    #[arg(long)]
    setup: bool,

    /// Best-effort configuration repair, then exit
    #[arg(long)]
    fix_config: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Begin a new piece of work (branch, issue, notification)
    Start,

    /// Resume work in progress with ranked recommendations
    Continue,

    /// Wrap up: stage, commit, test, push, open a pull request
    Finish,

    /// Show what the whole team is doing
    Team,

    /// Get unstuck: emergency escapes, repairs, and learning content
    HelpFlow,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") };
    tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).init();

    let mut app = App::new()?;
    let mut prompter = StdinPrompter;

    if cli.check_config {
        std::process::exit(app.check_config());
    }
    if cli.setup {
        std::process::exit(app.setup(&mut prompter)?);
    }
    if cli.fix_config {
        std::process::exit(app.fix_config());
    }

    app.install_hooks();

    let phase = match cli.command {
        Some(Commands::Start) => Phase::Start,
        Some(Commands::Continue) => Phase::Continue,
        Some(Commands::Finish) => Phase::Finish,
        Some(Commands::Team) => Phase::Team,
        Some(Commands::HelpFlow) => Phase::HelpFlow,
        None => {
            // No subcommand: print the short help and leave quietly.
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            return Ok(());
        }
    };

    let result = app.run(phase, &mut prompter);
    app.shutdown();
    std::process::exit(result.exit_code());
}
