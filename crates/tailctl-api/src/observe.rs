// ── Metrics hooks ──
//
// The client reports request outcomes through `MetricsSink`. Hosts plug in
// their own exporter; `InMemoryMetrics` keeps atomic counters and a
// fixed-bucket latency histogram for tests and diagnostics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Coarse outcome of one HTTP attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Success,
    ClientError,
    ServerError,
    /// No HTTP status was received.
    Transport,
}

impl StatusClass {
    pub fn from_status(status: u16) -> Self {
        match status {
            500.. => Self::ServerError,
            400..=499 => Self::ClientError,
            _ => Self::Success,
        }
    }
}

/// Receiver for client and dispatcher measurements.
///
/// Every method has a no-op default so sinks only implement what they export.
pub trait MetricsSink: Send + Sync + fmt::Debug {
    fn record_request(&self, _endpoint: &str, _class: StatusClass, _latency: Duration) {}
    fn record_rate_limit_exceeded(&self, _endpoint: &str) {}
    fn record_retries_exhausted(&self, _endpoint: &str) {}
    fn record_dispatch(&self, _tool: &str, _operation: &str, _ok: bool, _duration: Duration) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

/// Upper bounds (inclusive, milliseconds) of the latency histogram buckets.
/// A final overflow bucket catches everything slower.
pub const LATENCY_BUCKETS_MS: [u64; 8] = [10, 50, 100, 250, 500, 1_000, 2_500, 5_000];

#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    success: AtomicU64,
    client_error: AtomicU64,
    server_error: AtomicU64,
    transport: AtomicU64,
    rate_limit_exceeded: AtomicU64,
    retries_exhausted: AtomicU64,
    dispatch_ok: AtomicU64,
    dispatch_failed: AtomicU64,
    latency_buckets: [AtomicU64; LATENCY_BUCKETS_MS.len() + 1],
    latency_total_ms: AtomicU64,
}

/// Point-in-time copy of [`InMemoryMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub success: u64,
    pub client_error: u64,
    pub server_error: u64,
    pub transport: u64,
    pub rate_limit_exceeded: u64,
    pub retries_exhausted: u64,
    pub dispatch_ok: u64,
    pub dispatch_failed: u64,
    pub latency_buckets: Vec<u64>,
    pub latency_total_ms: u64,
}

impl MetricsSnapshot {
    pub fn requests(&self) -> u64 {
        self.success + self.client_error + self.server_error + self.transport
    }
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            success: load(&self.success),
            client_error: load(&self.client_error),
            server_error: load(&self.server_error),
            transport: load(&self.transport),
            rate_limit_exceeded: load(&self.rate_limit_exceeded),
            retries_exhausted: load(&self.retries_exhausted),
            dispatch_ok: load(&self.dispatch_ok),
            dispatch_failed: load(&self.dispatch_failed),
            latency_buckets: self.latency_buckets.iter().map(load).collect(),
            latency_total_ms: load(&self.latency_total_ms),
        }
    }

    fn bucket_index(latency: Duration) -> usize {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        LATENCY_BUCKETS_MS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len())
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record_request(&self, _endpoint: &str, class: StatusClass, latency: Duration) {
        let counter = match class {
            StatusClass::Success => &self.success,
            StatusClass::ClientError => &self.client_error,
            StatusClass::ServerError => &self.server_error,
            StatusClass::Transport => &self.transport,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let Some(bucket) = self.latency_buckets.get(Self::bucket_index(latency)) {
            bucket.fetch_add(1, Ordering::Relaxed);
        }
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_total_ms.fetch_add(ms, Ordering::Relaxed);
    }

    fn record_rate_limit_exceeded(&self, _endpoint: &str) {
        self.rate_limit_exceeded.fetch_add(1, Ordering::Relaxed);
    }

    fn record_retries_exhausted(&self, _endpoint: &str) {
        self.retries_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dispatch(&self, _tool: &str, _operation: &str, ok: bool, _duration: Duration) {
        let counter = if ok {
            &self.dispatch_ok
        } else {
            &self.dispatch_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        assert_eq!(StatusClass::from_status(200), StatusClass::Success);
        assert_eq!(StatusClass::from_status(404), StatusClass::ClientError);
        assert_eq!(StatusClass::from_status(503), StatusClass::ServerError);
    }

    #[test]
    fn histogram_buckets_latencies() {
        let metrics = InMemoryMetrics::new();
        metrics.record_request("devices", StatusClass::Success, Duration::from_millis(5));
        metrics.record_request("devices", StatusClass::Success, Duration::from_millis(300));
        metrics.record_request("acl", StatusClass::ServerError, Duration::from_secs(9));

        let snap = metrics.snapshot();
        assert_eq!(snap.requests(), 3);
        assert_eq!(snap.server_error, 1);
        assert_eq!(snap.latency_buckets[0], 1);
        assert_eq!(snap.latency_buckets[4], 1);
        assert_eq!(snap.latency_buckets[LATENCY_BUCKETS_MS.len()], 1);
        assert_eq!(snap.latency_total_ms, 9_305);
    }
}
