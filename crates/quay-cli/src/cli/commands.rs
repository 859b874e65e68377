//! Subcommand and argument definitions.

use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the development server
    ///
    /// Runs your bundler in watch mode behind an HTTP server with API
    /// proxying and an SPA fallback, restarting automatically when the
    /// project configuration changes.
    Dev(DevArgs),
}

/// Arguments for the dev command
#[derive(Args, Debug)]
pub struct DevArgs {
    /// Port for the development server
    ///
    /// The HTTP port to listen on. The server automatically scans upward
    /// for a free port when this one is in use.
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Path to the project configuration file
    ///
    /// Defaults to quay.config.json in the working directory when present.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Open the browser automatically on server start
    #[arg(long)]
    pub open: bool,
}
