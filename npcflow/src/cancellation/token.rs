//! Shared cancellation flag checked between pipeline stages.

use std::sync::{Arc, OnceLock};
use tokio::sync::Notify;

#[derive(Default)]
struct Shared {
    reason: OnceLock<String>,
    wake: Notify,
}

/// Requests that runs stop at the next stage boundary.
///
/// Clones observe the same state and the first reason given wins. A stage
/// that has already started finishes and is persisted before the run halts.
#[derive(Clone, Default)]
pub struct CancellationToken {
    shared: Arc<Shared>,
}

impl CancellationToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the token cancelled. Later calls are ignored.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self.shared.reason.set(reason.into()).is_ok() {
            self.shared.wake.notify_waiters();
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.reason.get().is_some()
    }

    /// The reason passed to the first `cancel`.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.shared.reason.get().map(String::as_str)
    }

    /// Owned reason when cancelled, `None` otherwise.
    #[must_use]
    pub fn checkpoint(&self) -> Option<String> {
        self.reason().map(str::to_owned)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let woken = self.shared.wake.notified();
            tokio::pin!(woken);
            woken.as_mut().enable();
            if self.is_cancelled() {
                break;
            }
            woken.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CancellationToken")
            .field(&self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fresh_token_has_no_reason() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.checkpoint(), None);
    }

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        token.cancel("operator shutdown");
        token.cancel("deadline");

        assert_eq!(token.reason(), Some("operator shutdown"));
        assert_eq!(token.checkpoint().as_deref(), Some("operator shutdown"));
    }

    #[test]
    fn test_clone_sees_cancel() {
        let token = CancellationToken::new();
        token.clone().cancel("batch aborted");
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_cancel() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel("done");

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_wait_on_cancelled_token_returns() {
        let token = CancellationToken::new();
        token.cancel("early");
        tokio_test::block_on(token.cancelled());
    }
}
