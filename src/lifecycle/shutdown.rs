//! Shutdown coordination for the dev server.
//!
//! The flag is sticky: a task that subscribes after `trigger` still stops,
//! so the rebuild loop can be spawned at any point during startup.

use tokio::sync::watch;

/// Coordinator shared by the server, the rebuild loop and the signal handler.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// One task's view of the shutdown flag.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal { rx: self.tx.subscribe() }
    }

    /// Raise the flag. Repeated calls are no-ops.
    pub fn trigger(&self) {
        self.tx.send_if_modified(|stopping| !std::mem::replace(stopping, true));
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Number of tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Resolve once shutdown has been triggered.
    ///
    /// Also resolves when every `Shutdown` handle is gone.
    pub async fn recv(&mut self) {
        let _ = self.rx.wait_for(|stopping| *stopping).await;
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
        let mut b = shutdown.clone().subscribe();
        assert_eq!(shutdown.receiver_count(), 2);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), a.recv()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), b.recv()).await.unwrap();
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.is_triggered());

        let mut late = shutdown.subscribe();
        tokio::time::timeout(Duration::from_secs(1), late.recv()).await.unwrap();
    }

    #[tokio::test]
    async fn test_pending_until_triggered() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        let waited = tokio::time::timeout(Duration::from_millis(50), signal.recv()).await;
        assert!(waited.is_err());
    }
}
