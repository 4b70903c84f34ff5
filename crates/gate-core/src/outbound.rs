use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

/// Shared open/closed flag for one connection.
///
/// Cloned into anything that may finish after the connection is gone; a
/// cleared flag turns pending responses into no-ops.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Default for Liveness {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

impl Liveness {
    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Write side of a connection as seen by a session.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    liveness: Liveness,
}

impl Outbound {
    pub fn new(tx: mpsc::UnboundedSender<Vec<u8>>, liveness: Liveness) -> Self {
        Self { tx, liveness }
    }

    /// Creates a handle plus the receiver a writer task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx, Liveness::default()), rx)
    }

    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    pub fn is_open(&self) -> bool {
        self.liveness.is_open() && !self.tx.is_closed()
    }

    /// Queues `bytes` for the writer. Dropped silently once closed.
    pub fn send(&self, bytes: Vec<u8>) {
        if !self.is_open() {
            tracing::debug!(len = bytes.len(), "outbound.send.dropped");
            return;
        }
        if self.tx.send(bytes).is_err() {
            self.liveness.close();
        }
    }

    pub fn close(&self) {
        self.liveness.close();
    }
}
