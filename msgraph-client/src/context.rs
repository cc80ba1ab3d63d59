//! Per-call deadline and cancellation context
//!
//! Every public client operation takes a `RequestContext`. The context is
//! honored at each suspension point: waiting for a token refresh, waiting
//! for a governor permit, the transport call itself, and retry backoff
//! sleeps. Cancelling the context wakes any of those waits with
//! [`GraphError::Cancelled`]; an elapsed deadline produces
//! [`GraphError::Timeout`].

use crate::error::GraphError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation and deadline scope for a single logical call.
///
/// Cloning shares the underlying token, so a caller can keep one clone and
/// cancel a call that is already in flight.
#[derive(Debug, Clone)]
pub struct RequestContext {
    started: Instant,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl RequestContext {
    /// Context with no deadline.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            deadline: Some(now + timeout),
            cancel: CancellationToken::new(),
        }
    }

    /// Context that expires at the given instant.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            started: Instant::now(),
            deadline: Some(deadline),
            cancel: CancellationToken::new(),
        }
    }

    /// Request cancellation. Every wait suspended on this context returns
    /// `Cancelled`; nothing new is admitted afterwards.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token shared with this context, for wiring into external shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Time left until the deadline. `None` when no deadline is set;
    /// `Some(ZERO)` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Drive `fut` to completion unless the context is cancelled or the
    /// deadline passes first. Checks cancellation before polling so an
    /// already-cancelled context never starts new work.
    pub(crate) async fn run<F: Future>(&self, fut: F) -> Result<F::Output, GraphError> {
        if self.cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }

        let deadline = self.deadline;
        let expiry = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(GraphError::Cancelled),
            _ = expiry => Err(GraphError::Timeout {
                elapsed: self.elapsed(),
                attempts: 0,
            }),
            out = fut => Ok(out),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_completes_future_without_deadline() {
        let ctx = RequestContext::new();
        let out = ctx.run(async { 41 + 1 }).await.unwrap();
        assert_eq!(out, 42);
    }

    #[tokio::test]
    async fn cancelled_context_refuses_new_work() {
        let ctx = RequestContext::new();
        ctx.cancel();

        let result = ctx.run(async { 1 }).await;
        assert!(matches!(result, Err(GraphError::Cancelled)));
    }

    #[tokio::test]
    async fn cancellation_preempts_a_blocked_wait() {
        let ctx = RequestContext::new();
        let handle = ctx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });

        let result = ctx.run(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(GraphError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_produces_timeout() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(2));

        let result = ctx.run(std::future::pending::<()>()).await;
        match result {
            Err(GraphError::Timeout { elapsed, .. }) => {
                assert!(elapsed >= Duration::from_secs(2));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn remaining_shrinks_towards_zero() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(30));
        let remaining = ctx.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(30));
        assert!(remaining > Duration::from_secs(29));
        assert!(RequestContext::new().remaining().is_none());
    }
}
