//! Project-config watch subscription.
//!
//! Watches one configuration file and emits a debounced tick per change.
//! The watcher value itself is the subscription handle: it is owned by
//! whoever wired the lifecycle manager, and dropping it tears the watch
//! down. There is no process-wide subscriber list.

use crate::error::{ConfigError, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Owned watch subscription for a single config file.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl ConfigWatcher {
    /// Start watching `path`, delivering one `()` per debounced change.
    ///
    /// The parent directory is watched non-recursively and events are
    /// filtered by file name, which survives editors that replace the file
    /// on save instead of writing in place.
    ///
    /// # Errors
    ///
    /// Fails when the file does not exist or the platform watcher cannot
    /// be created.
    pub fn watch(path: PathBuf, debounce_ms: u64) -> Result<(Self, mpsc::Receiver<()>)> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path).into());
        }

        let (tx, rx) = mpsc::channel(16);
        let debounce = Duration::from_millis(debounce_ms);
        let mut last_tick: Option<Instant> = None;
        let file_name = path.file_name().map(|name| name.to_os_string());

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let Ok(event) = result else { return };
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            if !event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name)
            {
                return;
            }

            let now = Instant::now();
            if let Some(last) = last_tick {
                if now.duration_since(last) < debounce {
                    return;
                }
            }
            last_tick = Some(now);

            // Receiver lag or shutdown is not an error worth surfacing here.
            let _ = tx.blocking_send(());
        })?;

        let dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        tracing::debug!("watching project config: {}", path.display());

        Ok((
            Self {
                _watcher: watcher,
                path,
            },
            rx,
        ))
    }

    /// The watched config file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
