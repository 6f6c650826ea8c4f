//! Cooperative cancellation for a run.
//!
//! [`CancelHandle::cancel`] flips a `watch` channel; every [`CancelToken`]
//! clone sees it. The pipeline checks the token before starting a file or a
//! batch and while sleeping between retries, so in-flight requests finish
//! and nothing new is started.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<bool>,
}

/// Cheap to clone; any clone can trigger cancellation.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> (CancelToken, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            CancelToken { receiver: rx },
            CancelHandle {
                sender: Arc::new(tx),
            },
        )
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once cancellation is requested. Never resolves if every
    /// handle was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    /// A token nobody can cancel.
    fn default() -> Self {
        Self::new().0
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn cancel_reaches_every_clone() {
        let (token, handle) = CancelToken::new();
        let other = token.clone();
        assert!(!token.is_cancelled());

        handle.clone().cancel();

        assert!(token.is_cancelled());
        assert!(other.is_cancelled());
        assert!(timeout(Duration::from_millis(100), other.cancelled())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn cancelled_wakes_waiter() {
        let (token, handle) = CancelToken::new();
        let waiter = tokio::spawn(async move { token.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        assert!(timeout(Duration::from_millis(500), waiter).await.is_ok());
    }

    #[tokio::test]
    async fn dropped_handle_never_cancels() {
        let token = CancelToken::default();
        assert!(!token.is_cancelled());
        assert!(timeout(Duration::from_millis(50), token.cancelled())
            .await
            .is_err());
    }
}
