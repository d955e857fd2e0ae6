//! Cooperative cancellation for handlers and background workers.
//!
//! A [`ShutdownController`] owns the signal; [`CancelToken`] clones travel
//! into every connection, handler and upload worker. Cancellation is
//! cooperative and idempotent: long operations check the token before each
//! I/O step and unwind without side effects beyond work already done.

use tokio::sync::watch;

/// Raised when an operation observed cancellation and stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Sender half of the shutdown signal, held by the server.
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        ShutdownController { tx }
    }

    /// A token observing this controller.
    pub fn token(&self) -> CancelToken {
        CancelToken { rx: self.tx.subscribe(), keepalive: None }
    }

    /// Signals cancellation to every outstanding token.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Cheap cloneable view of the shutdown signal.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    /// Detached tokens own their sender so the channel never closes.
    keepalive: Option<std::sync::Arc<watch::Sender<bool>>>,
}

impl CancelToken {
    /// A token that can never fire; used by tests and cache-only setups.
    pub fn detached() -> Self {
        let (tx, rx) = watch::channel(false);
        CancelToken { rx, keepalive: Some(std::sync::Arc::new(tx)) }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Errors with [`Cancelled`] once the signal fired; long operations
    /// call this before initiating their next I/O.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when cancellation is signalled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                // Controller dropped without signalling; treat as cancel.
                return;
            }
        }
    }
}
