// tailctl-api: Async Rust client for the Tailscale-style control-plane API

pub mod client;
pub mod endpoints;
pub mod error;
pub mod observe;
pub mod rate_limit;
pub mod retry;
pub mod transport;
pub mod types;

pub use client::{ApiClient, ApiClientBuilder, ApiRequest, ApiResponse, Page};
pub use error::{Error, ErrorKind, FieldError};
pub use observe::{InMemoryMetrics, MetricsSink, MetricsSnapshot, NoopMetrics, StatusClass};
pub use rate_limit::{BucketStats, Permit, RateLimitConfig, RateLimiter, endpoint_family};
pub use retry::{Idempotency, Jitter, RetryPolicy};
pub use transport::{TlsMode, TransportConfig};
