use std::sync::Arc;

use tokio::sync::watch;

/// One-way switch telling pipelines and queued work to stop.
///
/// Clones share the same switch. Once triggered it stays triggered.
#[derive(Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`ShutdownSignal::trigger`] has been called, immediately
    /// if it already was.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once set.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}
