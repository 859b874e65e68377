//! Server lifecycle: the restart protocol and ready-callback delivery.
//!
//! The manager runs as a single actor task. All session, registry and
//! state transitions happen inside its `select!` loop, so ordering - not
//! locking - provides the guarantees:
//!
//! - the old session's close fully completes before the replacement binds
//! - restarts are serialized; notifications arriving mid-restart coalesce
//!   into one follow-up restart (last writer wins)
//! - ready callbacks fire exactly once, in registration order, after the
//!   *current* session's first successful build - surviving restarts that
//!   happen while they wait

use crate::bundler::Bundler;
use crate::config::{ConfigLoad, DevConfig};
use crate::error::{Result, ServerError};
use crate::readiness::GateState;
use crate::session::ServerSession;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// A pending "first build ready" observer.
pub type ReadyCallback = Box<dyn FnOnce() + Send + 'static>;

enum Command {
    Ready(ReadyCallback),
    Close(oneshot::Sender<()>),
}

/// Caller-visible handle to a running dev server.
///
/// Cloneable; all clones address the same lifecycle manager.
#[derive(Clone)]
pub struct DevServerHandle {
    commands: mpsc::UnboundedSender<Command>,
    addr: Arc<RwLock<SocketAddr>>,
}

impl DevServerHandle {
    /// Register a callback for "the current build is ready".
    ///
    /// Fires exactly once, asynchronously with respect to this call, after
    /// the current session's first successful build. A callback registered
    /// while a restart is in flight fires on the replacement session's
    /// readiness; it is never dropped and never fired twice.
    pub fn ready<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self
            .commands
            .send(Command::Ready(Box::new(callback)))
            .is_err()
        {
            tracing::warn!("ready() called after the dev server closed; callback dropped");
        }
    }

    /// Address of the current session's listener.
    ///
    /// Updated on restart; the port can change when the preferred one was
    /// taken at rebind time.
    pub fn addr(&self) -> SocketAddr {
        *self.addr.read()
    }

    /// Close the current session and stop processing restarts.
    ///
    /// Idempotent: closing an already-closed server returns immediately.
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Close(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

/// Manager state. Exactly one of these holds at any time.
enum LifecycleState {
    /// A session is serving.
    Running(Box<ServerSession>),
    /// Between sessions during the restart protocol.
    Restarting,
    /// A restart failed after the old session was closed; the server is
    /// down but the manager still processes reload notifications.
    Down,
    /// Terminal: `close()` was called.
    Closed,
}

/// Owns the current session and drives the restart protocol.
pub struct LifecycleManager<L: ConfigLoad> {
    loader: L,
    bundler: Arc<dyn Bundler>,
    state: LifecycleState,
    callbacks: VecDeque<ReadyCallback>,
    gate_rx: watch::Receiver<GateState>,
    gate_settled: bool,
    /// Whether the *current* session's first build has succeeded. Reset on
    /// every restart so callbacks never fire against a stale session.
    session_ready: bool,
    addr: Arc<RwLock<SocketAddr>>,
    last_good: DevConfig,
    restart_fallback: bool,
}

impl<L: ConfigLoad> LifecycleManager<L> {
    /// Build the first session and spawn the lifecycle actor.
    ///
    /// `reloads` carries project-config-change notifications, one `()` per
    /// change (see [`crate::watcher::ConfigWatcher`]).
    ///
    /// # Errors
    ///
    /// Initial-start failures (config, port, bundler) propagate to the
    /// caller. Later restart failures are logged, not raised - there is no
    /// synchronous caller to raise them to.
    pub async fn start(
        loader: L,
        bundler: Arc<dyn Bundler>,
        reloads: mpsc::Receiver<()>,
    ) -> Result<DevServerHandle> {
        let config = loader.load().map_err(ServerError::ConfigReload)?;
        let session = ServerSession::start(&config, bundler.as_ref()).await?;

        let addr = Arc::new(RwLock::new(session.addr()));
        let gate_rx = session.gate().subscribe();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let manager = Self {
            loader,
            bundler,
            state: LifecycleState::Running(Box::new(session)),
            callbacks: VecDeque::new(),
            gate_rx,
            gate_settled: false,
            session_ready: false,
            addr: Arc::clone(&addr),
            restart_fallback: config.restart_fallback,
            last_good: config,
        };
        tokio::spawn(manager.run(commands_rx, reloads));

        Ok(DevServerHandle {
            commands: commands_tx,
            addr,
        })
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut reloads: mpsc::Receiver<()>,
    ) {
        loop {
            let mut gate_rx = self.gate_rx.clone();
            tokio::select! {
                settled = async {
                    gate_rx
                        .wait_for(|state| !matches!(state, GateState::Pending))
                        .await
                        .map(|state| state.clone())
                },
                    if !self.gate_settled =>
                {
                    self.gate_settled = true;
                    let outcome = match settled {
                        Ok(state) => state,
                        Err(_) => GateState::Failed("readiness gate dropped".to_string()),
                    };
                    match outcome {
                        GateState::Ready => {
                            self.session_ready = true;
                            tracing::info!(
                                "first build ready; delivering {} pending callback(s)",
                                self.callbacks.len()
                            );
                            self.drain_callbacks();
                        }
                        GateState::Failed(reason) => {
                            tracing::error!("server will not become ready: {reason}");
                        }
                        GateState::Pending => unreachable!("wait_for only yields settled states"),
                    }
                }

                Some(command) = commands.recv() => {
                    match command {
                        Command::Ready(callback) => {
                            self.callbacks.push_back(callback);
                            if self.session_ready {
                                // Past readiness: deliver now, on the actor
                                // turn - still async from the caller's view
                                // and ordered with everyone else.
                                self.drain_callbacks();
                            }
                        }
                        Command::Close(ack) => {
                            self.close_current().await;
                            self.state = LifecycleState::Closed;
                            let _ = ack.send(());
                            break;
                        }
                    }
                }

                Some(()) = reloads.recv() => {
                    // Coalesce notifications queued behind this one; the
                    // merged config is recomputed once, so the last writer
                    // wins.
                    while reloads.try_recv().is_ok() {}
                    self.restart().await;
                }

                else => break,
            }
        }
    }

    /// Drain the registry in FIFO order, isolating panicking callbacks.
    fn drain_callbacks(&mut self) {
        while let Some(callback) = self.callbacks.pop_front() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(callback)) {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::error!("ready callback panicked: {message}");
            }
        }
    }

    async fn close_current(&mut self) {
        if let LifecycleState::Running(session) = &mut self.state {
            session.close().await;
        }
    }

    /// The restart protocol: close, reload, rebuild, re-arm the gate.
    async fn restart(&mut self) {
        if matches!(self.state, LifecycleState::Closed) {
            return;
        }
        tracing::info!("project configuration changed; restarting dev server");

        // Committed teardown: the old session closes before the replacement
        // is confirmed. Its close fully completes here, releasing the port.
        self.close_current().await;
        self.state = LifecycleState::Restarting;
        self.session_ready = false;

        let config = match self.loader.load() {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("configuration reload failed: {e}");
                self.handle_failed_restart().await;
                return;
            }
        };

        match self.open_session(&config).await {
            Ok(()) => {
                self.restart_fallback = config.restart_fallback;
                self.last_good = config;
            }
            Err(e) => {
                tracing::error!("restart failed: {e}");
                self.handle_failed_restart().await;
            }
        }
    }

    async fn open_session(&mut self, config: &DevConfig) -> Result<()> {
        let session = ServerSession::start(config, self.bundler.as_ref()).await?;
        *self.addr.write() = session.addr();
        self.gate_rx = session.gate().subscribe();
        self.gate_settled = false;
        self.session_ready = false;
        self.state = LifecycleState::Running(Box::new(session));
        tracing::info!("dev server restarted at http://{}", self.addr.read());
        Ok(())
    }

    async fn handle_failed_restart(&mut self) {
        if self.restart_fallback {
            tracing::warn!("rebuilding from the last known good configuration");
            let last_good = self.last_good.clone();
            match self.open_session(&last_good).await {
                Ok(()) => return,
                Err(e) => tracing::error!("fallback restart failed: {e}"),
            }
        }

        // The old session is already closed: the server stays down until a
        // later reload produces a valid configuration.
        self.state = LifecycleState::Down;
        self.gate_settled = true;
    }
}
