//! rigger CLI - Main Entry Point
//!
//! Runs build tasks and integration test sessions: external servers are
//! started in order, tests run against them, and everything is stopped
//! again, also on Ctrl-C.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

use commands::{bump, check, clean, list, run, test, up, watch, Context};

/// rigger - process orchestration for build and test pipelines
#[derive(Parser, Debug)]
#[command(name = "rigger")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(
        short,
        long,
        env = "RIGGER_CONFIG",
        default_value = rigger_common::DEFAULT_CONFIG_FILE,
        global = true
    )]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run tasks in order
    Run(run::RunArgs),

    /// Start all processes and keep them running until Ctrl-C
    Up,

    /// Run the test task inside a process session
    Test(test::TestArgs),

    /// Re-run a task whenever sources change
    Watch(watch::WatchArgs),

    /// Bump the version in package manifests
    Bump(bump::BumpArgs),

    /// Remove build output
    Clean(clean::CleanArgs),

    /// List configured processes and tasks
    List(list::ListArgs),

    /// Validate the configuration file
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let ctx = Context::new(cli.config);

    let result = match cli.command {
        Commands::Run(args) => run::execute(args, &ctx).await,
        Commands::Up => up::execute(&ctx).await,
        Commands::Test(args) => test::execute(args, &ctx).await,
        Commands::Watch(args) => watch::execute(args, &ctx).await,
        Commands::Bump(args) => bump::execute(args, &ctx).await,
        Commands::Clean(args) => clean::execute(args, &ctx).await,
        Commands::List(args) => list::execute(args, &ctx).await,
        Commands::Check => check::execute(&ctx).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(commands::exit_code(&e));
    }
}
