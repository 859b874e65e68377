//! Development server command implementation.
//!
//! Wires the config loader, config-file watcher and command bundler into
//! the lifecycle manager, then waits for Ctrl+C.

use crate::cli::DevArgs;
use crate::error::Result;
use crate::ui;
use quay_server::{
    CommandBundler, ConfigLoad, ConfigWatcher, FileConfigLoader, LifecycleManager,
};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;

/// Execute the dev command.
///
/// # Process Flow
///
/// 1. Discover and load the merged configuration
/// 2. Subscribe to project-config changes (when a config file exists)
/// 3. Start the lifecycle manager (first session: port, listener, bundler)
/// 4. Report readiness when the first build lands
/// 5. Wait for Ctrl+C, then close the current session
pub async fn execute(args: DevArgs) -> Result<()> {
    ui::info("Starting development server...");

    let loader = FileConfigLoader::discover(args.config.clone()).with_port(args.port);
    let config = loader.load()?;
    tracing::debug!("merged configuration: {config:?}");
    let open = args.open || config.auto_open_browser;

    let (watcher, reloads) = match loader.path() {
        Some(path) => {
            let (watcher, reloads) =
                ConfigWatcher::watch(path.to_path_buf(), config.watch_debounce_ms)?;
            ui::info(&format!("Watching project config: {}", path.display()));
            (Some(watcher), reloads)
        }
        None => {
            ui::warning("No quay.config.json found; config changes will not trigger restarts");
            // A closed reload channel simply disables restarts.
            let (_tx, reloads) = mpsc::channel(1);
            (None, reloads)
        }
    };

    let handle = LifecycleManager::start(loader, Arc::new(CommandBundler), reloads).await?;
    let url = format!("http://{}", handle.addr());
    ui::success(&format!("Development server running at {url}"));

    handle.ready(|| ui::success("First build completed; app is ready"));

    if open {
        open_browser(&url);
    }

    ui::info("Press Ctrl+C to stop");
    if let Err(e) = signal::ctrl_c().await {
        ui::warning(&format!("Failed to listen for shutdown signal: {e}"));
    }

    ui::info("Shutting down development server...");
    handle.close().await;
    drop(watcher);
    ui::success("Development server stopped");
    Ok(())
}

/// Open the server URL in the default browser.
///
/// Uses platform-specific commands:
/// - macOS: `open`
/// - Windows: `start`
/// - Linux: `xdg-open`
fn open_browser(url: &str) {
    use std::process::Command;

    let result = if cfg!(target_os = "macos") {
        Command::new("open").arg(url).spawn()
    } else if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", url]).spawn()
    } else {
        Command::new("xdg-open").arg(url).spawn()
    };

    match result {
        Ok(_) => ui::info(&format!("Opened browser at {url}")),
        Err(e) => ui::warning(&format!("Failed to open browser: {e}")),
    }
}
