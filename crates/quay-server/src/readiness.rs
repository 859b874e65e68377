//! First-success readiness latch over a bundler's event stream.
//!
//! The gate resolves exactly once, on the first completed build. Later
//! rebuilds - successes and failures alike - are reported through the log
//! side channel and never touch the latch.

use crate::bundler::BuildEvent;
use crate::error::{Result, ServerError};
use tokio::sync::{mpsc, watch};

/// Observable state of the readiness latch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    /// No successful build yet.
    Pending,
    /// The first build succeeded; the latch stays set.
    Ready,
    /// The bundler stopped before its first success.
    Failed(String),
}

/// Single-resolution readiness gate for one session.
pub struct ReadinessGate {
    state: watch::Receiver<GateState>,
}

impl ReadinessGate {
    /// Spawn the event pump over a bundler's event stream.
    ///
    /// A failed build *before* the first success keeps the gate pending -
    /// a watch-mode compiler recovers when the developer fixes the file.
    /// Only the stream ending (compiler death) fails the gate.
    pub fn new(mut events: mpsc::Receiver<BuildEvent>, notify_on_errors: bool) -> Self {
        let (tx, rx) = watch::channel(GateState::Pending);

        tokio::spawn(async move {
            let mut ready = false;
            while let Some(event) = events.recv().await {
                match event {
                    BuildEvent::Started => {
                        tracing::debug!("build started");
                    }
                    BuildEvent::Completed { duration_ms } => {
                        tracing::info!("build completed in {duration_ms}ms");
                        if !ready {
                            ready = true;
                            let _ = tx.send(GateState::Ready);
                        }
                    }
                    BuildEvent::Failed { error } => {
                        if ready {
                            // Rebuild failures go out-of-band, never through the latch.
                            if notify_on_errors {
                                tracing::error!("rebuild failed: {error}");
                            } else {
                                tracing::warn!("rebuild failed: {error}");
                            }
                        } else {
                            tracing::warn!("build failed before first success: {error}");
                        }
                    }
                }
            }
            if !ready {
                let _ = tx.send(GateState::Failed(
                    "bundler stopped before the first successful build".to_string(),
                ));
            }
        });

        Self { state: rx }
    }

    /// Wait for the first successful build.
    ///
    /// Resolves immediately once the latch is set.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::BuildFailed`] when the bundler died before
    /// ever succeeding.
    pub async fn first_success(&self) -> Result<()> {
        let mut state = self.state.clone();
        let settled = state
            .wait_for(|state| !matches!(state, GateState::Pending))
            .await
            .map(|settled| settled.clone());

        match settled {
            Ok(GateState::Ready) => Ok(()),
            Ok(GateState::Failed(reason)) => Err(ServerError::BuildFailed(reason)),
            Ok(GateState::Pending) => unreachable!("wait_for only yields settled states"),
            // The pump always publishes a final state before dropping the sender.
            Err(_) => Err(ServerError::BuildFailed(
                "readiness gate dropped while pending".to_string(),
            )),
        }
    }

    /// Whether the first build has already succeeded.
    pub fn is_ready(&self) -> bool {
        matches!(*self.state.borrow(), GateState::Ready)
    }

    /// A receiver for observing the latch without holding the gate.
    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.state.clone()
    }
}
