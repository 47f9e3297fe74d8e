use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Broadcasts a shutdown signal to every live connection and tracks how
/// many are still open.
///
/// Each connection handler calls [`register`](Self::register) and keeps the
/// returned guard alive for as long as it runs. The receiver flips to `true`
/// once [`shutdown`](Self::shutdown) is called.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    tx: Arc<watch::Sender<bool>>,
    active: Arc<AtomicUsize>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that decrements the active connection count on drop.
pub struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Release);
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn register(&self) -> (ConnectionGuard, watch::Receiver<bool>) {
        self.active.fetch_add(1, Ordering::AcqRel);
        let guard = ConnectionGuard {
            active: Arc::clone(&self.active),
        };
        (guard, self.tx.subscribe())
    }

    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Poll until every registered connection has dropped its guard or
    /// `timeout` elapses. Returns `true` if all connections closed.
    pub async fn wait_for_all_closed(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.active_count() > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }
}
