use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;

use commands::config::{execute_config, ConfigArgs};
use commands::run::{execute_run, RunArgs};

/// Strand Command Line Interface
///
/// Runs the fan-out application on a local actor system and inspects the
/// runtime configuration.
#[derive(Parser)]
#[clap(name = "strand", author, version, about)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fan-out application and print each task's outcome
    Run(RunArgs),

    /// Print the effective configuration as JSON
    Config(ConfigArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Run(args) => execute_run(args).map(|summary| summary.failed == 0),
        Commands::Config(args) => execute_config(args).map(|_| true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}
