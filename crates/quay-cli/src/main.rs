//! Quay - development server orchestrator for front-end build pipelines.
//!
//! Entry point: parses arguments, initializes logging, dispatches the
//! command, and renders failures as miette diagnostics.

use clap::Parser;
use miette::Result;
use quay_cli::{cli, commands, error, logger, ui};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);
    ui::init_colors();

    let result = match args.command {
        cli::Command::Dev(dev_args) => commands::dev_execute(dev_args).await,
    };

    result.map_err(error::to_report)
}
