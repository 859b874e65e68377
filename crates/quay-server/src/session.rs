//! Server session: one listener + one bundler + one readiness gate.
//!
//! A session is the unit of restart. It moves Created -> Listening ->
//! Closed, and a closed session is terminal: the lifecycle manager always
//! builds a brand-new session instead of reviving one.

use crate::bundler::{Bundler, CompilerHandle};
use crate::config::DevConfig;
use crate::error::{Result, ServerError};
use crate::port;
use crate::readiness::ReadinessGate;
use crate::router;
use std::net::SocketAddr;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A running dev server session.
pub struct ServerSession {
    addr: SocketAddr,
    compiler: CompilerHandle,
    gate: ReadinessGate,
    shutdown: Option<oneshot::Sender<()>>,
    serve_task: Option<JoinHandle<()>>,
}

impl ServerSession {
    /// Created -> Listening.
    ///
    /// Allocates a port, binds the listener, mounts the request pipeline,
    /// starts the bundler and wraps it in a readiness gate. The bound
    /// address may differ from the requested port.
    ///
    /// # Errors
    ///
    /// Port allocation and bundler startup failures abort the session; a
    /// bundler failure shuts the already-bound listener down before
    /// returning, so no port is leaked.
    pub async fn start(config: &DevConfig, bundler: &dyn Bundler) -> Result<Self> {
        let addr = port::allocate(config.port).await?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Server(format!("failed to bind {addr}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::Server(format!("listener has no local address: {e}")))?;

        let app = router::build_router(config);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let serve_task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!("dev server error: {e}");
            }
        });

        let mut compiler = match bundler.compile(config).await {
            Ok(compiler) => compiler,
            Err(e) => {
                let _ = shutdown_tx.send(());
                let _ = serve_task.await;
                return Err(e);
            }
        };

        let events = compiler.take_events().ok_or_else(|| {
            ServerError::BundlerStart("bundler produced no event stream".to_string())
        })?;
        let gate = ReadinessGate::new(events, config.notify_on_errors);

        tracing::info!("development server listening at http://{addr}");

        Ok(Self {
            addr,
            compiler,
            gate,
            shutdown: Some(shutdown_tx),
            serve_task: Some(serve_task),
        })
    }

    /// The bound listener address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The session's readiness gate.
    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    /// Listening -> Closed. Idempotent: closing twice is a no-op.
    ///
    /// Stops the bundler, triggers graceful shutdown, and awaits the serve
    /// task so the OS port is fully released before this returns - the
    /// property the restart protocol relies on to avoid a double bind.
    pub async fn close(&mut self) {
        if self.shutdown.is_none() && self.serve_task.is_none() {
            return;
        }

        self.compiler.stop();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(serve_task) = self.serve_task.take() {
            if let Err(e) = serve_task.await {
                tracing::debug!("serve task ended abnormally: {e}");
            }
        }
        tracing::info!("dev server on {} closed", self.addr);
    }
}

impl Drop for ServerSession {
    fn drop(&mut self) {
        // A dropped-but-unclosed session must still release its port.
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(serve_task) = self.serve_task.take() {
            serve_task.abort();
        }
    }
}
