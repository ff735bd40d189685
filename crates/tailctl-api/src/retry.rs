// ── Retry with exponential backoff ──
//
// Wraps a single remote call. Only transient failures are retried, and only
// when the call site declares the request idempotent. Backoff uses full
// jitter and honours a server `Retry-After` as a floor.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::Error;

/// Whether a request may safely be sent more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    Idempotent,
    NonIdempotent,
}

impl Idempotency {
    pub fn is_idempotent(self) -> bool {
        matches!(self, Self::Idempotent)
    }
}

/// Randomisation applied to each computed backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    /// Sleep exactly the computed delay.
    None,
    /// Sleep a uniform random duration in `[0, delay]`.
    #[default]
    Full,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    /// Cap on any single backoff.
    pub max_delay: Duration,
    /// Cap on the sum of all backoffs for one call.
    pub max_total_wait: Duration,
    pub jitter: Jitter,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            factor: 2.0,
            max_delay: Duration::from_secs(10),
            max_total_wait: Duration::from_secs(30),
            jitter: Jitter::Full,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Un-jittered backoff ceiling before retry number `retry` (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.factor.max(1.0).powi(exp);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    fn delay_for(&self, retry: u32, err: &Error) -> Duration {
        let ceiling = self.backoff(retry);
        let delay = match self.jitter {
            Jitter::None => ceiling,
            Jitter::Full => rand::thread_rng().gen_range(Duration::ZERO..=ceiling),
        };
        err.retry_after().map_or(delay, |floor| delay.max(floor))
    }

    /// Run `op` until it succeeds, fails permanently, or the budget is spent.
    ///
    /// `op` receives the 1-based attempt number. Non-idempotent calls get a
    /// single attempt and their error is returned unwrapped.
    pub async fn execute<T, F, Fut>(
        &self,
        idempotency: Idempotency,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, Error>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let max_attempts = if idempotency.is_idempotent() {
            self.max_attempts.max(1)
        } else {
            1
        };
        let mut waited = Duration::ZERO;
        let mut attempt = 1;

        loop {
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_transient() || max_attempts == 1 {
                return Err(err);
            }

            if attempt >= max_attempts {
                warn!(attempt, error = %err, "retries exhausted");
                return Err(exhausted(attempt, waited, err));
            }

            let delay = self.delay_for(attempt - 1, &err);
            if waited + delay > self.max_total_wait {
                warn!(
                    attempt,
                    waited_ms = waited.as_millis(),
                    delay_ms = delay.as_millis(),
                    "retry budget exhausted"
                );
                return Err(exhausted(attempt, waited, err));
            }

            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis(),
                error = %err,
                "transient failure, backing off"
            );

            tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }

            waited += delay;
            attempt += 1;
        }
    }
}

fn exhausted(attempts: u32, waited: Duration, source: Error) -> Error {
    Error::RetriesExhausted {
        attempts,
        waited,
        source: Box::new(source),
    }
}
