//! Retry logic with exponential backoff.
//!
//! [`execute`] runs an attempt function under a [`RetryPolicy`]:
//! `Attempting -> Success | Waiting -> Attempting | Terminal-Failure`.
//! The context is checked before every attempt and races every backoff wait.

use super::response::HttpResponse;
use crate::base::callcontext::CallContext;
use crate::base::neterror::NetError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Decides whether an outcome is retried. Exactly one of the two arguments
/// is `Some`.
pub type RetryPredicate =
    Arc<dyn Fn(Option<&HttpResponse>, Option<&NetError>) -> bool + Send + Sync>;

/// Configuration for retry behavior.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (default: 3). 1 means no retry.
    pub max_attempts: usize,
    /// Wait before the second attempt (default: 100ms).
    pub initial_interval: Duration,
    /// Cap on any single wait (default: 5s).
    pub max_interval: Duration,
    /// Growth factor applied after each wait (default: 2.0).
    pub multiplier: f64,
    /// Fractional randomization in `[0, 1]` (default: 0.0).
    pub jitter: f64,
    /// Retry decision. `None` retries transport errors only.
    pub retry_if: Option<RetryPredicate>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_interval", &self.initial_interval)
            .field("max_interval", &self.max_interval)
            .field("multiplier", &self.multiplier)
            .field("jitter", &self.jitter)
            .field("retry_if", &self.retry_if.as_ref().map(|_| "custom"))
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.0,
            retry_if: None,
        }
    }
}

impl RetryPolicy {
    /// A policy that performs a single attempt.
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Default::default() }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_interval = initial;
        self.max_interval = max;
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Install the retry predicate, replacing the transport-error default.
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(Option<&HttpResponse>, Option<&NetError>) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    /// Retry on transport errors and on 5xx responses.
    pub fn retry_server_errors(self) -> Self {
        self.retry_if(|resp, err| match (resp, err) {
            (Some(r), _) => r.status().is_server_error(),
            (None, Some(e)) => e.is_transport(),
            (None, None) => false,
        })
    }

    /// Apply the predicate, or the transport-error default.
    pub fn should_retry(&self, resp: Option<&HttpResponse>, err: Option<&NetError>) -> bool {
        match &self.retry_if {
            Some(predicate) => predicate(resp, err),
            None => err.is_some_and(NetError::is_transport),
        }
    }

    /// `min(current * multiplier, max_interval)`.
    pub fn next_interval(&self, current: Duration) -> Duration {
        let scaled = current.as_secs_f64() * self.multiplier.max(1.0);
        Duration::try_from_secs_f64(scaled).unwrap_or(self.max_interval).min(self.max_interval)
    }

    /// Un-jittered wait before attempt `attempt + 1` (0-based).
    pub fn backoff(&self, attempt: usize) -> Duration {
        (0..attempt).fold(self.initial_interval.min(self.max_interval), |d, _| self.next_interval(d))
    }

    /// Randomize `interval` within `[interval * (1 - jitter), interval * (1 + jitter)]`.
    fn jittered(&self, interval: Duration) -> Duration {
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return interval;
        }
        let factor = 1.0 + jitter * (fastrand::f64() * 2.0 - 1.0);
        Duration::try_from_secs_f64(interval.as_secs_f64() * factor).unwrap_or(interval)
    }
}

/// Run `call` under `policy`, honoring `ctx`.
///
/// With no policy the call runs exactly once. The last outcome is returned
/// unchanged when attempts run out.
pub async fn execute<F, Fut>(
    policy: Option<&RetryPolicy>,
    ctx: &CallContext,
    mut call: F,
) -> Result<HttpResponse, NetError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<HttpResponse, NetError>>,
{
    let Some(policy) = policy else {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        return call(0).await;
    };

    let max_attempts = policy.max_attempts.max(1);
    let mut interval = policy.initial_interval.min(policy.max_interval);
    let mut attempt = 0;
    loop {
        if let Some(err) = ctx.err() {
            debug!(attempt, error = %err, "context ended before attempt");
            return Err(err);
        }

        let outcome = call(attempt).await;
        let retry = match &outcome {
            Ok(resp) => policy.should_retry(Some(resp), None),
            Err(err) => policy.should_retry(None, Some(err)),
        };
        if !retry {
            return outcome;
        }
        if attempt + 1 >= max_attempts {
            debug!(attempts = max_attempts, "retry attempts exhausted");
            return outcome;
        }

        let wait = policy.jittered(interval);
        match &outcome {
            Ok(resp) => debug!(attempt, status = %resp.status(), delay_ms = wait.as_millis() as u64, "retrying after backoff"),
            Err(err) => debug!(attempt, error = %err, delay_ms = wait.as_millis() as u64, "retrying after backoff"),
        }
        ctx.sleep(wait).await?;

        interval = policy.next_interval(interval);
        attempt += 1;
    }
}
