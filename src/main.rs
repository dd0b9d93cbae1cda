//! Tracklab CLI - Batch Audio Processing
//!
//! Command-line interface for the Tracklab pipeline.

use clap::Parser;
use env_logger::Env;
use log::debug;

use tracklab::cli::{commands, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    debug!("Tracklab v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Process {
            input,
            output,
            options,
        } => commands::process(&input, output.as_deref(), &options),
        Commands::Analyze { input } => commands::analyze(&input),
        Commands::Batch {
            input_dir,
            output_dir,
            options,
        } => commands::batch(&input_dir, &output_dir, &options),
    }
}
