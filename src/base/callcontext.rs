//! Cancellation and deadline carrier for a single call.
//!
//! A [`CallContext`] is cheap to clone and travels with a request through
//! middleware, the retry executor and the transport. Every suspension point
//! in the engine (network I/O and backoff sleeps) races against
//! [`CallContext::done`].

use crate::base::neterror::NetError;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Cancellation/deadline carrier.
///
/// The default context never cancels and has no deadline.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    // One receiver per cancellable ancestor; any of them firing cancels.
    cancel: Vec<watch::Receiver<bool>>,
}

/// Cancels every [`CallContext`] derived from [`CallContext::with_cancel`].
///
/// Dropping the canceller without calling [`Canceller::cancel`] leaves the
/// contexts uncancelled.
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CallContext {
    /// A context that never cancels and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a cancellable context.
    ///
    /// The child keeps this context's deadline and observes both its own
    /// canceller and every canceller of its ancestors.
    pub fn with_cancel(&self) -> (CallContext, Canceller) {
        let (tx, rx) = watch::channel(false);
        let mut cancel = self.cancel.clone();
        cancel.push(rx);
        let ctx = CallContext {
            deadline: self.deadline,
            cancel,
        };
        (ctx, Canceller { tx })
    }

    /// Derive a context whose deadline is at most `timeout` from now.
    ///
    /// An earlier existing deadline is kept.
    pub fn with_timeout(&self, timeout: Duration) -> CallContext {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a context with the given deadline, keeping an earlier one.
    pub fn with_deadline(&self, deadline: Instant) -> CallContext {
        let deadline = match self.deadline {
            Some(existing) if existing <= deadline => existing,
            _ => deadline,
        };
        CallContext {
            deadline: Some(deadline),
            cancel: self.cancel.clone(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, if any.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// The context error, if the context is already cancelled or expired.
    pub fn err(&self) -> Option<NetError> {
        if self.cancel.iter().any(|rx| *rx.borrow()) {
            return Some(NetError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(NetError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves with the context error once the context is cancelled or its
    /// deadline passes. Never resolves for a background context.
    pub async fn done(&self) -> NetError {
        let cancelled = async {
            if self.cancel.is_empty() {
                return std::future::pending::<()>().await;
            }
            let waits = self.cancel.iter().cloned().map(|mut rx| {
                Box::pin(async move {
                    let fired = rx.wait_for(|c| *c).await.is_ok();
                    if !fired {
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
            _ = cancelled => NetError::Cancelled,
            _ = expired => NetError::DeadlineExceeded,
        }
    }

    /// Run `fut` unless the context ends first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, NetError>
    where
        F: Future<Output = Result<T, NetError>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            out = fut => out,
        }
    }

    /// Sleep for `duration` unless the context ends first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), NetError> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_has_no_deadline() {
        let ctx = CallContext::background();
        assert!(ctx.deadline().is_none());
        assert!(ctx.err().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_keeps_earlier_deadline() {
        let short = CallContext::background().with_timeout(Duration::from_millis(100));
        let derived = short.with_timeout(Duration::from_secs(10));
        assert_eq!(short.deadline(), derived.deadline());

        let shorter = short.with_timeout(Duration::from_millis(10));
        assert!(shorter.deadline() < short.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expiry() {
        let ctx = CallContext::background().with_timeout(Duration::from_millis(50));
        let err = ctx.sleep(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, NetError::DeadlineExceeded));
        assert!(matches!(ctx.err(), Some(NetError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_sleep() {
        let (ctx, canceller) = CallContext::background().with_cancel();
        let task = tokio::spawn(async move { ctx.sleep(Duration::from_secs(30)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();

        let res = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("cancellation should be prompt")
            .unwrap();
        assert!(matches!(res, Err(NetError::Cancelled)));
    }

    #[tokio::test]
    async fn test_dropped_canceller_does_not_cancel() {
        let (ctx, canceller) = CallContext::background().with_cancel();
        drop(canceller);
        assert!(ctx.err().is_none());
        assert!(ctx.sleep(Duration::from_millis(5)).await.is_ok());
    }

    #[tokio::test]
    async fn test_parent_cancel_reaches_child() {
        let (parent, canceller) = CallContext::background().with_cancel();
        let (child, _child_canceller) = parent.with_cancel();

        canceller.cancel();
        let err = tokio::time::timeout(Duration::from_secs(2), child.done())
            .await
            .expect("child should observe parent cancellation");
        assert!(err.is_cancelled());
    }
}
