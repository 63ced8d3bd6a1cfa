//! Graceful shutdown coordination.
//!
//! WebSocket handlers register here for the lifetime of their connection.
//! On shutdown the relay flips the broadcast signal; each handler sends a
//! normal close frame, exits its loop, and drops its guard. Once every
//! guard is gone [`ShutdownCoordinator::wait_for_all_closed`] returns and
//! the process can stop the listener and exit.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
pub struct ShutdownCoordinator {
    signal: Arc<watch::Sender<bool>>,
    count: Arc<watch::Sender<usize>>,
}

/// RAII guard for one live connection; dropping it decrements the count.
pub struct ConnectionGuard {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.count.send_modify(|c| *c = c.saturating_sub(1));
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        let (count, _) = watch::channel(0);
        Self {
            signal: Arc::new(signal),
            count: Arc::new(count),
        }
    }

    /// Register a connection. Returns the guard plus a receiver that
    /// flips to `true` when shutdown is signaled.
    pub fn register(&self) -> (ConnectionGuard, watch::Receiver<bool>) {
        self.count.send_modify(|c| *c += 1);
        (
            ConnectionGuard {
                count: Arc::clone(&self.count),
            },
            self.signal.subscribe(),
        )
    }

    /// Number of connections currently registered.
    pub fn active_count(&self) -> usize {
        *self.count.borrow()
    }

    /// Tell every registered connection to close.
    pub fn shutdown(&self) {
        let _ = self.signal.send(true);
    }

    /// Wait until every registered connection has dropped its guard.
    pub async fn wait_for_all_closed(&self) {
        let mut rx = self.count.subscribe();
        loop {
            if *rx.borrow_and_update() == 0 {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
