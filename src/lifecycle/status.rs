//! Server status gate.
//!
//! # Responsibilities
//! - Hold the single busy/idle/error status of the server
//! - Admit at most one build cycle at a time
//! - Restore a settled status on every exit path of a cycle
//!
//! # Design Decisions
//! - Backed by a `watch` channel so waiters can await the gate reopening
//! - `try_begin` is the only way into busy for build cycles; it is atomic
//!   with respect to other callers (`send_if_modified`)
//! - Busy callers are rejected, never queued

use std::fmt;

use tokio::sync::watch;

/// Global server status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerStatus {
    Busy(String),
    Idle,
    Error(String),
}

impl ServerStatus {
    pub fn is_busy(&self) -> bool {
        matches!(self, ServerStatus::Busy(_))
    }

    /// The status message, if the status carries one.
    pub fn message(&self) -> Option<&str> {
        match self {
            ServerStatus::Busy(m) | ServerStatus::Error(m) => Some(m),
            ServerStatus::Idle => None,
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStatus::Busy(m) => write!(f, "busy: {m}"),
            ServerStatus::Idle => f.write_str("idle"),
            ServerStatus::Error(m) => write!(f, "error: {m}"),
        }
    }
}

/// Owner of the server status.
#[derive(Debug, Clone)]
pub struct StatusManager {
    tx: watch::Sender<ServerStatus>,
    latch_errors: bool,
}

impl StatusManager {
    /// A new manager, initially `busy("starting")`.
    pub fn new(latch_errors: bool) -> Self {
        let (tx, _) = watch::channel(ServerStatus::Busy("starting".into()));
        Self { tx, latch_errors }
    }

    pub fn set_busy(&self, message: impl Into<String>) {
        self.transition(ServerStatus::Busy(message.into()));
    }

    pub fn set_idle(&self) {
        self.transition(ServerStatus::Idle);
    }

    pub fn set_error(&self, message: impl Into<String>) {
        self.transition(ServerStatus::Error(message.into()));
    }

    pub fn current(&self) -> ServerStatus {
        self.tx.borrow().clone()
    }

    /// Enter busy(`phase`) unless a cycle is already running.
    pub fn try_begin(&self, phase: impl Into<String>) -> Option<BusyGuard> {
        let phase = phase.into();
        let mut previous = None;
        let admitted = self.tx.send_if_modified(|status| {
            if status.is_busy() {
                return false;
            }
            previous = Some(std::mem::replace(status, ServerStatus::Busy(phase.clone())));
            true
        });

        if !admitted {
            return None;
        }
        tracing::debug!(phase = %phase, previous = ?previous, "Status -> busy");
        Some(BusyGuard {
            manager: self.clone(),
            failure: None,
        })
    }

    /// Record an error raised outside a build cycle.
    ///
    /// A running cycle owns the status; the error is only logged then.
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        let applied = self.tx.send_if_modified(|status| {
            if status.is_busy() {
                return false;
            }
            *status = ServerStatus::Error(message.clone());
            true
        });
        if !applied {
            tracing::debug!(error = %message, "Error reported while busy");
        }
    }

    /// Reopen the gate after a handled request error, unless errors latch.
    pub fn recover(&self) {
        if self.latch_errors {
            return;
        }
        self.tx.send_if_modified(|status| {
            if matches!(status, ServerStatus::Error(_)) {
                *status = ServerStatus::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Wait until no cycle is running.
    pub async fn wait_until_not_busy(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|status| !status.is_busy()).await;
    }

    fn transition(&self, next: ServerStatus) {
        tracing::debug!(status = %next, "Status transition");
        self.tx.send_replace(next);
    }
}

/// An admitted build cycle.
///
/// Dropping the guard settles the status: `error` if the cycle called
/// [`BusyGuard::fail`], `idle` otherwise.
#[derive(Debug)]
pub struct BusyGuard {
    manager: StatusManager,
    failure: Option<String>,
}

impl BusyGuard {
    /// Update the busy message for the running cycle.
    pub fn set_phase(&self, phase: impl Into<String>) {
        self.manager.set_busy(phase);
    }

    /// Mark the cycle as failed; applied when the guard drops.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.failure = Some(message.into());
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        match self.failure.take() {
            Some(message) => self.manager.set_error(message),
            None => self.manager.set_idle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn idle_manager(latch: bool) -> StatusManager {
        let manager = StatusManager::new(latch);
        manager.set_idle();
        manager
    }

    #[test]
    fn test_starts_busy() {
        let manager = StatusManager::new(false);
        assert_eq!(manager.current(), ServerStatus::Busy("starting".into()));
        assert!(manager.try_begin("building").is_none());
    }

    #[test]
    fn test_single_flight() {
        let manager = idle_manager(false);
        let guard = manager.try_begin("building").unwrap();
        assert!(manager.try_begin("building").is_none());
        assert_eq!(manager.current().message(), Some("building"));

        drop(guard);
        assert_eq!(manager.current(), ServerStatus::Idle);
        assert!(manager.try_begin("building").is_some());
    }

    #[test]
    fn test_guard_failure_sets_error() {
        let manager = idle_manager(false);
        {
            let mut guard = manager.try_begin("building").unwrap();
            guard.set_phase("building api/date.js");
            assert_eq!(manager.current().message(), Some("building api/date.js"));
            guard.fail("boom");
        }
        assert_eq!(manager.current(), ServerStatus::Error("boom".into()));

        // An errored server still admits the next cycle.
        assert!(manager.try_begin("building").is_some());
    }

    #[test]
    fn test_guard_settles_on_early_return() {
        fn cycle(manager: &StatusManager) -> Result<(), &'static str> {
            let _guard = manager.try_begin("building").ok_or("busy")?;
            Err("bail")
        }
        let manager = idle_manager(false);
        assert_eq!(cycle(&manager), Err("bail"));
        assert_eq!(manager.current(), ServerStatus::Idle);
    }

    #[test]
    fn test_fail_is_ignored_while_busy() {
        let manager = idle_manager(false);
        let _guard = manager.try_begin("building").unwrap();
        manager.fail("late");
        assert!(manager.current().is_busy());
    }

    #[test]
    fn test_recover_respects_latch() {
        let resetting = idle_manager(false);
        resetting.fail("bad config");
        resetting.recover();
        assert_eq!(resetting.current(), ServerStatus::Idle);

        let latching = idle_manager(true);
        latching.fail("bad config");
        latching.recover();
        assert_eq!(latching.current(), ServerStatus::Error("bad config".into()));
    }

    #[tokio::test]
    async fn test_wait_until_not_busy() {
        let manager = idle_manager(false);
        let guard = manager.try_begin("building").unwrap();

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.wait_until_not_busy().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
