// ── Client-side rate limiting ──
//
// One GCRA bucket per endpoint family. Each bucket holds its theoretical
// arrival time (TAT) in nanoseconds since the limiter epoch; callers reserve
// the next free slot with a compare-and-swap and then sleep until it. Slots
// are handed out in reservation order, so waiters are served roughly FIFO.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Error;

/// Limiter configuration. Rates are requests per second.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Rate applied to any family without an override. `0` disables limiting.
    pub requests_per_second: f64,
    /// Per-family overrides, keyed by endpoint family (`"devices"`, `"acl"`, ...).
    pub per_endpoint: HashMap<String, f64>,
    /// Longest a caller will wait for a slot before failing fast.
    pub max_wait: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1.0,
            per_endpoint: HashMap::new(),
            max_wait: Duration::from_secs(30),
        }
    }
}

/// Proof that a slot was acquired, with how long the caller waited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permit {
    pub endpoint: String,
    pub waited: Duration,
}

/// Snapshot of one bucket, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketStats {
    pub endpoint: String,
    pub requests_per_second: f64,
    /// How far in the future the next unreserved slot lies.
    pub next_slot_in: Duration,
}

struct Bucket {
    rate: f64,
    interval_nanos: u64,
    tat: AtomicU64,
}

/// Keyed, lock-free request spacer shared by every clone of an
/// [`ApiClient`](crate::ApiClient).
pub struct RateLimiter {
    config: RateLimitConfig,
    epoch: Instant,
    buckets: DashMap<String, Arc<Bucket>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("buckets", &self.buckets.len())
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            epoch: Instant::now(),
            buckets: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Configured rate for a family, falling back to the default.
    pub fn rate_for(&self, endpoint: &str) -> f64 {
        self.config
            .per_endpoint
            .get(endpoint)
            .copied()
            .unwrap_or(self.config.requests_per_second)
    }

    /// Minimum spacing between two requests of a family.
    pub fn interval_for(&self, endpoint: &str) -> Duration {
        let rate = self.rate_for(endpoint);
        if rate.is_finite() && rate > 0.0 {
            Duration::from_secs_f64(1.0 / rate)
        } else {
            Duration::ZERO
        }
    }

    /// Wait for a slot in `endpoint`'s bucket.
    ///
    /// Fails with [`Error::RateLimitWait`] without consuming a slot when the
    /// next free slot lies beyond `max_wait`, and with [`Error::Cancelled`]
    /// if `cancel` fires while waiting.
    pub async fn acquire(&self, endpoint: &str, cancel: &CancellationToken) -> Result<Permit, Error> {
        let wait = self.reserve(endpoint)?;

        if !wait.is_zero() {
            debug!(endpoint, wait_ms = wait.as_millis(), "waiting for rate limit slot");
            tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(wait) => {}
            }
        }

        Ok(Permit {
            endpoint: endpoint.to_owned(),
            waited: wait,
        })
    }

    /// Reserve the next slot and return how long until it opens.
    pub fn reserve(&self, endpoint: &str) -> Result<Duration, Error> {
        let bucket = self.bucket(endpoint);
        if bucket.interval_nanos == 0 {
            return Ok(Duration::ZERO);
        }

        let max_wait = nanos(self.config.max_wait);
        loop {
            let now = self.now_nanos();
            let tat = bucket.tat.load(Ordering::Acquire);
            let slot = tat.max(now);
            let wait = slot - now;

            if wait > max_wait {
                warn!(endpoint, wait_ms = wait / 1_000_000, "rate limit wait exceeds ceiling");
                return Err(Error::RateLimitWait {
                    endpoint: endpoint.to_owned(),
                    wait: Duration::from_nanos(wait),
                    max_wait: self.config.max_wait,
                });
            }

            let next = slot.saturating_add(bucket.interval_nanos);
            if bucket
                .tat
                .compare_exchange_weak(tat, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(Duration::from_nanos(wait));
            }
        }
    }

    /// Per-family state, sorted by family name.
    pub fn stats(&self) -> Vec<BucketStats> {
        let now = self.now_nanos();
        let mut stats: Vec<BucketStats> = self
            .buckets
            .iter()
            .map(|entry| BucketStats {
                endpoint: entry.key().clone(),
                requests_per_second: entry.value().rate,
                next_slot_in: Duration::from_nanos(
                    entry.value().tat.load(Ordering::Acquire).saturating_sub(now),
                ),
            })
            .collect();
        stats.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        stats
    }

    fn bucket(&self, endpoint: &str) -> Arc<Bucket> {
        if let Some(existing) = self.buckets.get(endpoint) {
            return Arc::clone(existing.value());
        }
        let rate = self.rate_for(endpoint);
        let interval_nanos = nanos(self.interval_for(endpoint));
        let entry = self.buckets.entry(endpoint.to_owned()).or_insert_with(|| {
            Arc::new(Bucket {
                rate,
                interval_nanos,
                tat: AtomicU64::new(0),
            })
        });
        Arc::clone(entry.value())
    }

    fn now_nanos(&self) -> u64 {
        nanos(Instant::now().duration_since(self.epoch))
    }
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Logical endpoint family of a tailnet-relative path: its first segment.
///
/// `"devices/abc/tags"` and `"devices?fields=all"` both map to `"devices"`.
pub fn endpoint_family(path: &str) -> &str {
    let path = path.trim_start_matches('/');
    let end = path.find(['/', '?']).unwrap_or(path.len());
    &path[..end]
}
