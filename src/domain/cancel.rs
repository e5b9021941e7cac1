//! Cooperative cancellation for the blocking poll loops.
//!
//! The control API offers no push mechanism, so the readiness gate and the
//! three scan-phase loops busy-wait with fixed sleeps. A cancel token
//! threaded through each loop lets an external abort (Ctrl-C, a CI abort)
//! interrupt the sleep promptly instead of waiting out the scan.

use std::sync::Arc;

use tokio::sync::watch;

/// Trips the associated [`CancelToken`]s. Held by the entry point.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Cheap clonable token checked inside poll loops.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    // Keeps the channel open for tokens created without a handle.
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl CancelToken {
    /// Create a handle/token pair. The token starts untripped.
    pub fn new() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (
            CancelHandle { tx },
            CancelToken {
                rx,
                _keepalive: None,
            },
        )
    }

    /// A token that can never be cancelled, for callers without an abort
    /// source (tests, the verdict step).
    pub fn never() -> CancelToken {
        let (tx, rx) = watch::channel(false);
        CancelToken {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when the token trips; intended for `tokio::select!` against
    /// a sleep. Pends forever if the handle is dropped untripped.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|tripped| *tripped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_observes_cancel() {
        let (handle, token) = CancelToken::new();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_trip() {
        let (handle, mut token) = CancelToken::new();
        handle.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), token.cancelled())
            .await
            .expect("cancelled() should resolve once tripped");
    }

    #[tokio::test]
    async fn never_token_stays_untripped() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
    }
}
