//! Quay CLI - development server orchestrator for front-end build pipelines.
//!
//! This crate provides the command-line interface over [`quay_server`]: it
//! parses arguments, wires the config loader, file watcher and bundler into
//! the lifecycle manager, and renders errors and status output.
//!
//! # Architecture
//!
//! - [`error`] - CLI error type and miette rendering
//! - [`logger`] - structured logging with tracing
//! - [`ui`] - terminal status messages
//! - `cli` - clap argument definitions
//! - `commands` - command implementations

pub mod cli;
pub mod commands;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{CliError, Result};
