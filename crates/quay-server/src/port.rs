//! Free-port allocation with a bounded upward scan.
//!
//! Allocation probes by binding a throwaway socket and dropping it, so a
//! failed session bind can retry without double-allocating. The session
//! performs the real bind afterwards.

use crate::error::{Result, ServerError};
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// How many ports above the requested one are probed before giving up.
pub const PORT_SCAN_RANGE: u16 = 10;

/// Find a bindable port, preferring `preferred`.
///
/// Probes `preferred` first, then scans upward through [`PORT_SCAN_RANGE`]
/// successors. Returns the loopback address of the first port that accepts
/// a bind.
///
/// # Errors
///
/// Returns [`ServerError::PortAllocation`] when every port in the range is
/// taken or the OS refuses sockets entirely.
pub async fn allocate(preferred: u16) -> Result<SocketAddr> {
    if preferred != 0 && preferred < 1024 {
        tracing::warn!("Port {preferred} is in privileged range, may require elevated permissions");
    }

    for offset in 0..=PORT_SCAN_RANGE {
        let port = match preferred.checked_add(offset) {
            Some(port) => port,
            None => break,
        };
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        match TcpListener::bind(addr).await {
            Ok(probe) => {
                // The probe socket is released here; the caller binds for real.
                drop(probe);
                if offset > 0 {
                    tracing::warn!("Port {preferred} is busy, using port {port} instead");
                }
                return Ok(addr);
            }
            Err(_) => continue,
        }
    }

    Err(ServerError::PortAllocation {
        start: preferred,
        end: preferred.saturating_add(PORT_SCAN_RANGE),
    })
}
