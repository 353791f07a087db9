//! Shutdown coordination for the service.

use std::future::Future;
use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
#[derive(Clone)]
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Future that resolves once [`Shutdown::trigger`] is called.
    ///
    /// Subscribes immediately, so a trigger after this call is never missed.
    pub fn signalled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_reaches_all_subscribers() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let b = shutdown.signalled();
        assert_eq!(shutdown.receiver_count(), 2);

        shutdown.trigger();

        assert!(a.recv().await.is_ok());
        tokio::time::timeout(Duration::from_secs(1), b).await.unwrap();
    }

    #[tokio::test]
    async fn test_signalled_pending_until_trigger() {
        let shutdown = Shutdown::new();
        let signalled = shutdown.signalled();
        let waited = tokio::time::timeout(Duration::from_millis(50), signalled).await;
        assert!(waited.is_err());
    }
}
