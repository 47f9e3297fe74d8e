use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Ordered display lines shared between the receive path and the renderer.
///
/// The lock is held only to push a line or copy lines out. Readers get an
/// owned copy and draw after the lock is released, so a slow redraw never
/// blocks an append.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    lines: Arc<Mutex<Vec<String>>>,
    changed: Arc<Notify>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line and wake the renderer.
    pub fn append(&self, line: impl Into<String>) {
        let line = line.into();
        self.lines.lock().push(line);
        self.changed.notify_one();
    }

    /// Copy of every line, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Copy of the most recent `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let lines = self.lines.lock();
        let start = lines.len().saturating_sub(n);
        lines[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves after the next append (or immediately if an append happened
    /// since the last wakeup was consumed).
    pub async fn changed(&self) {
        self.changed.notified().await;
    }
}
