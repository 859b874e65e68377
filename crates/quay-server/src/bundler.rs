//! Bundler collaborator interface and the command-process implementation.
//!
//! The core never looks inside a compiler. It starts one through the
//! [`Bundler`] trait, reads its [`BuildEvent`] stream, and stops it through
//! the returned [`CompilerHandle`]. The shipped implementation supervises
//! the project's own watch-mode build command as a child process.

use crate::config::DevConfig;
use crate::error::{Result, ServerError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};

/// Events reported by a running bundler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BuildEvent {
    /// Compilation has begun.
    Started,

    /// A build completed successfully.
    Completed {
        /// Time since the previous build boundary.
        duration_ms: u64,
    },

    /// A build failed.
    Failed {
        /// Compiler-reported failure line.
        error: String,
    },
}

/// Handle to a running incremental compiler.
///
/// The event receiver is taken exactly once, by the readiness gate.
/// `stop()` is idempotent; dropping the handle stops the compiler too.
#[derive(Debug)]
pub struct CompilerHandle {
    events: Option<mpsc::Receiver<BuildEvent>>,
    stop: Option<oneshot::Sender<()>>,
}

impl CompilerHandle {
    /// Wrap an event stream and a stop trigger.
    pub fn new(events: mpsc::Receiver<BuildEvent>, stop: oneshot::Sender<()>) -> Self {
        Self {
            events: Some(events),
            stop: Some(stop),
        }
    }

    /// Take the build event stream. Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<BuildEvent>> {
        self.events.take()
    }

    /// Stop the compiler. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl Drop for CompilerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts an incremental compiler for a configuration.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Start compiling. The handle's event stream reports build progress
    /// until the compiler is stopped or dies.
    async fn compile(&self, config: &DevConfig) -> Result<CompilerHandle>;
}

/// Bundler that supervises the project's watch-mode build command.
///
/// Stdout lines are matched (case-insensitively) against the configured
/// ready/error patterns to derive build events; all output is forwarded to
/// the log. The child is killed on `stop()`, releasing any file-watch
/// handles it holds.
pub struct CommandBundler;

#[async_trait]
impl Bundler for CommandBundler {
    async fn compile(&self, config: &DevConfig) -> Result<CompilerHandle> {
        let settings = &config.bundler;
        if settings.command.trim().is_empty() {
            return Err(ServerError::BundlerStart(
                "no bundler command configured".to_string(),
            ));
        }

        let mut command = Command::new(&settings.command);
        command
            .args(&settings.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &settings.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| {
            ServerError::BundlerStart(format!("failed to spawn `{}`: {e}", settings.command))
        })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "quay::bundler", "{line}");
                }
            });
        }

        let stdout = child.stdout.take();
        let (events_tx, events_rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = oneshot::channel();

        tokio::spawn(supervise(
            child,
            stdout,
            events_tx,
            stop_rx,
            settings.ready_pattern.to_lowercase(),
            settings.error_pattern.to_lowercase(),
        ));

        Ok(CompilerHandle::new(events_rx, stop_tx))
    }
}

/// Pump the child's stdout into build events until stop or process death.
///
/// Dropping the event sender on exit is the death signal the readiness
/// gate observes.
async fn supervise(
    mut child: Child,
    stdout: Option<ChildStdout>,
    events: mpsc::Sender<BuildEvent>,
    mut stop: oneshot::Receiver<()>,
    ready_pattern: String,
    error_pattern: String,
) {
    let _ = events.send(BuildEvent::Started).await;
    let mut build_started = Instant::now();

    let Some(stdout) = stdout else {
        let _ = stop.await;
        let _ = child.kill().await;
        return;
    };
    let mut lines = BufReader::new(stdout).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        tracing::info!(target: "quay::bundler", "{line}");
                        let lower = line.to_lowercase();
                        if !error_pattern.is_empty() && lower.contains(&error_pattern) {
                            let _ = events.send(BuildEvent::Failed { error: line }).await;
                            build_started = Instant::now();
                        } else if lower.contains(&ready_pattern) {
                            let duration_ms = build_started.elapsed().as_millis() as u64;
                            let _ = events.send(BuildEvent::Completed { duration_ms }).await;
                            build_started = Instant::now();
                        }
                    }
                    Ok(None) | Err(_) => {
                        // stdout closed: the compiler is gone
                        let _ = child.wait().await;
                        break;
                    }
                }
            }
            _ = &mut stop => {
                if let Err(e) = child.kill().await {
                    tracing::debug!("bundler process already exited: {e}");
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BundlerConfig, DevConfig};

    fn shell_config(script: &str) -> DevConfig {
        DevConfig {
            bundler: BundlerConfig {
                command: "sh".to_string(),
                args: vec!["-c".to_string(), script.to_string()],
                ready_pattern: "compiled successfully".to_string(),
                error_pattern: "build error".to_string(),
                cwd: None,
            },
            ..DevConfig::default()
        }
    }

    #[tokio::test]
    async fn test_compile_reports_first_success() {
        let config = shell_config("echo 'Compiled successfully in 120ms'; sleep 5");
        let mut handle = CommandBundler.compile(&config).await.unwrap();
        let mut events = handle.take_events().unwrap();

        assert!(matches!(events.recv().await, Some(BuildEvent::Started)));
        assert!(matches!(
            events.recv().await,
            Some(BuildEvent::Completed { .. })
        ));

        handle.stop();
    }

    #[tokio::test]
    async fn test_compile_reports_failures() {
        let config = shell_config("echo 'BUILD ERROR: missing module'; sleep 5");
        let mut handle = CommandBundler.compile(&config).await.unwrap();
        let mut events = handle.take_events().unwrap();

        assert!(matches!(events.recv().await, Some(BuildEvent::Started)));
        match events.recv().await {
            Some(BuildEvent::Failed { error }) => assert!(error.contains("missing module")),
            other => panic!("expected a failed build, got {other:?}"),
        }

        handle.stop();
    }

    #[tokio::test]
    async fn test_event_stream_closes_when_process_exits() {
        let config = shell_config("exit 0");
        let mut handle = CommandBundler.compile(&config).await.unwrap();
        let mut events = handle.take_events().unwrap();

        // Started, then the stream ends with the process.
        assert!(matches!(events.recv().await, Some(BuildEvent::Started)));
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let config = shell_config("sleep 30");
        let mut handle = CommandBundler.compile(&config).await.unwrap();
        let mut events = handle.take_events().unwrap();
        assert!(matches!(events.recv().await, Some(BuildEvent::Started)));

        handle.stop();
        handle.stop();

        // The supervisor kills the child and drops the sender.
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_compile_rejects_missing_command() {
        let config = DevConfig::default();
        let err = CommandBundler.compile(&config).await.unwrap_err();
        assert!(matches!(err, ServerError::BundlerStart(_)));
    }

    #[tokio::test]
    async fn test_take_events_is_single_shot() {
        let (_tx, rx) = mpsc::channel(1);
        let (stop_tx, _stop_rx) = oneshot::channel();
        let mut handle = CompilerHandle::new(rx, stop_tx);
        assert!(handle.take_events().is_some());
        assert!(handle.take_events().is_none());
    }
}
