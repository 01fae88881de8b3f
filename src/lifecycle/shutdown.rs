//! Shutdown coordination.

use std::future::Future;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Coordinator for graceful shutdown.
///
/// Every long-running task subscribes to one broadcast channel; triggering
/// it asks all of them to wind down.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every subscriber. Returns how many were listening.
    pub fn trigger(&self) -> usize {
        self.tx.send(()).unwrap_or(0)
    }

    /// Trigger once `signal` completes.
    pub fn trigger_on<F>(&self, signal: F) -> JoinHandle<()>
    where
        F: Future + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            signal.await;
            let listeners = this.trigger();
            tracing::info!(listeners, "Shutdown triggered");
        })
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
