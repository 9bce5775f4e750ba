//! Cancellation capability passed by value into every layer.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cloneable cancellation signal. All clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }

    /// A token cancelled together with `self`, but cancellable on its own
    pub fn child(&self) -> CancelToken {
        Self {
            inner: self.inner.child_token(),
        }
    }

    /// Run `callback` once the token is cancelled.
    ///
    /// Must be called from within a Tokio runtime. Dropping the returned
    /// registration before cancellation discards the callback.
    pub fn on_cancel<F>(&self, callback: F) -> CancelRegistration
    where
        F: FnOnce() + Send + 'static,
    {
        let token = self.inner.clone();
        let handle = tokio::spawn(async move {
            token.cancelled().await;
            callback();
        });
        CancelRegistration { handle }
    }
}

/// Keeps an [`CancelToken::on_cancel`] callback armed while alive
#[derive(Debug)]
pub struct CancelRegistration {
    handle: JoinHandle<()>,
}

impl CancelRegistration {
    /// Wait for the callback to run (or for the registration to be aborted)
    pub async fn finished(mut self) {
        let _ = (&mut self.handle).await;
    }
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            self.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        token.cancel();
        assert!(clone.is_cancelled());
        clone.cancelled().await;
    }

    #[tokio::test]
    async fn test_child_follows_parent_but_not_the_reverse() {
        let parent = CancelToken::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());

        let second = parent.child();
        parent.cancel();
        assert!(second.is_cancelled());
    }

    #[tokio::test]
    async fn test_on_cancel_runs_callback_once() {
        let token = CancelToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registration = token.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        token.cancel();
        registration.finished().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_registration_never_fires() {
        let token = CancelToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        drop(token.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        token.cancel();
        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
