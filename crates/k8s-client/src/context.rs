//! Request context: cancellation and deadlines
//!
//! A `RequestContext` is threaded through every client call. Derived contexts
//! inherit every ancestor's cancellation and the earliest deadline. When a
//! context fires, the in-flight request future is dropped, which closes its
//! connection.

use crate::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a context ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// `CancelHandle::cancel` was called
    Canceled,
    /// The deadline passed
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Canceled => f.write_str("context canceled"),
            CancelReason::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

/// Cancellation token plus optional deadline
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: Vec<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Cancels the context it was created with (and all contexts derived from it)
///
/// Dropping the handle does not cancel.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Cancel the associated context
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl RequestContext {
    /// Context that is never canceled and has no deadline
    pub fn background() -> Self {
        Self::default()
    }

    /// Derived context that can additionally be canceled through the handle
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let mut child = self.clone();
        child.cancel.push(rx);
        (child, CancelHandle { tx: Arc::new(tx) })
    }

    /// Derived context that expires after `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derived context that expires at `deadline` (or earlier, if inherited)
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.clone();
        child.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        child
    }

    /// Effective deadline
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Reason the context has ended, without waiting
    pub fn err(&self) -> Option<CancelReason> {
        if self.cancel.iter().any(|rx| *rx.borrow()) {
            return Some(CancelReason::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is canceled or its deadline passes
    pub async fn done(&self) -> CancelReason {
        let canceled = async {
            if self.cancel.is_empty() {
                return std::future::pending::<()>().await;
            }
            let waits = self.cancel.iter().cloned().map(|mut rx| {
                Box::pin(async move {
                    // Err means every handle was dropped without canceling
                    let closed = rx.wait_for(|canceled| *canceled).await.is_err();
                    if closed {
                        std::future::pending::<()>().await;
                    }
                })
            });
            futures::future::select_all(waits).await;
        };

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = canceled => CancelReason::Canceled,
            () = expired => CancelReason::DeadlineExceeded,
        }
    }

    /// Run `fut` unless the context ends first
    ///
    /// When the context wins, `fut` is dropped before it completes.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        if let Some(reason) = self.err() {
            return Err(Error::Canceled(reason));
        }
        tokio::select! {
            biased;
            reason = self.done() => Err(Error::Canceled(reason)),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_never_ends() {
        let ctx = RequestContext::background();
        assert_eq!(ctx.err(), None);

        let result = tokio::time::timeout(Duration::from_millis(20), ctx.done()).await;
        assert!(result.is_err(), "background context must not finish");
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let (ctx, cancel) = RequestContext::background().with_cancel();
        let waiter = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.done().await }
        });

        cancel.cancel();
        assert_eq!(waiter.await.expect("join"), CancelReason::Canceled);
        assert_eq!(ctx.err(), Some(CancelReason::Canceled));
    }

    #[tokio::test]
    async fn test_child_inherits_parent_cancel() {
        let (parent, cancel) = RequestContext::background().with_cancel();
        let (child, _child_cancel) = parent.with_cancel();
        let child = child.with_timeout(Duration::from_secs(60));

        cancel.cancel();
        assert_eq!(child.done().await, CancelReason::Canceled);
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_reach_parent() {
        let parent = RequestContext::background();
        let (_child, cancel) = parent.with_cancel();
        cancel.cancel();
        assert_eq!(parent.err(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let ctx = RequestContext::background().with_timeout(Duration::from_secs(5));
        assert_eq!(ctx.err(), None);
        assert_eq!(ctx.done().await, CancelReason::DeadlineExceeded);
        assert_eq!(ctx.err(), Some(CancelReason::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_earliest_deadline_wins() {
        let now = Instant::now();
        let ctx = RequestContext::background()
            .with_deadline(now + Duration::from_secs(1))
            .with_deadline(now + Duration::from_secs(60));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let (ctx, cancel) = RequestContext::background().with_cancel();
        drop(cancel);

        let result = tokio::time::timeout(Duration::from_millis(20), ctx.done()).await;
        assert!(result.is_err());
        assert_eq!(ctx.err(), None);
    }

    #[tokio::test]
    async fn test_run_drops_future_on_cancel() {
        let (ctx, cancel) = RequestContext::background().with_cancel();
        cancel.cancel();

        let result: Result<(), Error> = ctx
            .run(async {
                std::future::pending::<()>().await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Canceled(CancelReason::Canceled))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out() {
        let ctx = RequestContext::background().with_timeout(Duration::from_millis(100));
        let result: Result<(), Error> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Canceled(CancelReason::DeadlineExceeded))));
    }
}
