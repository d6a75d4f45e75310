//! Per-call abort signalling.
//!
//! An [`AbortHandle`] is held by whoever may cancel a resolution (for example
//! a host server noticing the client went away); the matching
//! [`AbortSignal`] is passed into the engine.

use tokio::sync::watch;

/// Create a connected handle/signal pair.
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx }, AbortSignal { rx: Some(rx) })
}

/// Cancels the resolution observing the paired [`AbortSignal`].
#[derive(Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Abort. Idempotent.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed side of an abort. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_aborted(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once aborted. Pends forever if the handle was dropped
    /// without aborting.
    pub async fn aborted(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn abort_wakes_waiter() {
        let (handle, signal) = abort_pair();
        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.aborted().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!signal.is_aborted());
        handle.abort();
        waiter.await.unwrap();
        assert!(signal.is_aborted());
    }

    #[tokio::test(start_paused = true)]
    async fn signal_observed_after_abort() {
        let (handle, signal) = abort_pair();
        handle.abort();
        tokio::time::timeout(Duration::from_millis(1), signal.aborted())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn never_and_dropped_handle_do_not_fire() {
        let never = AbortSignal::never();
        assert!(tokio::time::timeout(Duration::from_secs(1), never.aborted()).await.is_err());

        let (handle, signal) = abort_pair();
        drop(handle);
        assert!(!signal.is_aborted());
        assert!(tokio::time::timeout(Duration::from_secs(1), signal.aborted()).await.is_err());
    }
}
