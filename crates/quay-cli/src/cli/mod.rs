//! Command-line interface definition for Quay.
//!
//! Argument parsing is a thin surface on purpose: everything beyond the
//! port and config path lives in `quay.config.json`.

mod commands;

use clap::Parser;

pub use commands::{Command, DevArgs};

/// Quay - a development server orchestrator for front-end build pipelines
#[derive(Parser, Debug)]
#[command(
    name = "quay",
    version,
    about = "A development server orchestrator for front-end build pipelines",
    long_about = "Quay starts an HTTP dev server over your bundler's watch mode: it serves\n\
                  compiled output, forwards API calls through a proxy table, falls back to\n\
                  your root document for client-side routes, and restarts the whole stack\n\
                  when the project configuration changes."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}
