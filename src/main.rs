//! Wavebattle CLI - run, stress and watch territorial wave battles.

// Allow print in the CLI binary
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod cli;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Wavebattle - a territorial wave battle engine
#[derive(Parser, Debug)]
#[command(name = "wavebattle")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scripted battle to completion
    Simulate {
        /// Scenario JSON file
        #[arg(required = true)]
        scenario: std::path::PathBuf,

        /// Settings file overriding the scenario's settings
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: cli::OutputFormat,

        /// Print every event as a JSON line while the battle runs
        #[arg(short, long)]
        events: bool,
    },

    /// Run many randomized battles in parallel and aggregate results
    Stress {
        /// Number of battles to run (default: 1000)
        #[arg(short, long, default_value = "1000")]
        games: u64,

        /// Starting seed (increments for each battle)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Parallel threads (default: CPU count)
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: cli::OutputFormat,

        /// Show progress bar
        #[arg(short, long)]
        progress: bool,
    },

    /// Interactive TUI to watch a scripted battle
    Watch {
        /// Scenario JSON file
        #[arg(required = true)]
        scenario: std::path::PathBuf,

        /// Delay between ticks in milliseconds (default: 100)
        #[arg(long, default_value = "100")]
        speed: u64,
    },

    /// Load and check a settings file
    ValidateConfig {
        /// Settings JSON file (default: built-in settings)
        path: Option<std::path::PathBuf>,
    },
}

fn init_tracing(default: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Log lines would tear the TUI; keep it quiet unless RUST_LOG asks.
    let default_filter = match args.command {
        Commands::Watch { .. } => "off",
        Commands::Stress { .. } => "warn",
        _ => "info",
    };
    init_tracing(default_filter);

    let result = match args.command {
        Commands::Simulate {
            scenario,
            config,
            format,
            events,
        } => cli::simulate::execute(scenario, config, format, events),

        Commands::Stress {
            games,
            seed,
            threads,
            format,
            progress,
        } => cli::stress::execute(games, seed, threads, format, progress),

        Commands::Watch { scenario, speed } => cli::watch::execute(scenario, speed),

        Commands::ValidateConfig { path } => cli::validate::execute(path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
