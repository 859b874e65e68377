//! Quay development server core.
//!
//! This crate holds everything behind the `quay dev` command: the HTTP
//! session serving bundler output, the API proxy table, and the lifecycle
//! manager that restarts the whole stack when the project configuration
//! changes.
//!
//! # Architecture
//!
//! - [`port`] - free-port allocation with bounded upward scan
//! - [`bundler`] - bundler collaborator interface and the command-process implementation
//! - [`readiness`] - single-resolution "first successful build" latch
//! - [`proxy`] - ordered proxy rules and request forwarding
//! - [`router`] - request pipeline: proxy dispatch, static assets, SPA fallback
//! - [`session`] - one listener + one bundler + one gate, created and destroyed as a unit
//! - [`lifecycle`] - the restart protocol and ready-callback delivery
//! - [`watcher`] - project-config watch subscription
//! - [`config`] - typed configuration with figment-based merging
//! - [`error`] - error taxonomy
//!
//! # Example
//!
//! ```rust,no_run
//! use quay_server::{CommandBundler, FileConfigLoader, LifecycleManager};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> quay_server::Result<()> {
//! let loader = FileConfigLoader::discover(None);
//! let (_tx, reloads) = mpsc::channel(1);
//! let handle = LifecycleManager::start(loader, Arc::new(CommandBundler), reloads).await?;
//! handle.ready(|| println!("first build is ready"));
//! # Ok(())
//! # }
//! ```

pub mod bundler;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod port;
pub mod proxy;
pub mod readiness;
pub mod router;
pub mod session;
pub mod watcher;

// Re-export commonly used types
pub use bundler::{BuildEvent, Bundler, CommandBundler, CompilerHandle};
pub use config::{BundlerConfig, ConfigLoad, DevConfig, FileConfigLoader, ProxyEntry};
pub use error::{ConfigError, Result, ServerError};
pub use lifecycle::{DevServerHandle, LifecycleManager, ReadyCallback};
pub use readiness::{GateState, ReadinessGate};
pub use session::ServerSession;
pub use watcher::ConfigWatcher;
