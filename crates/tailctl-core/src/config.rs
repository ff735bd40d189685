// ── Client configuration ──
//
// Everything needed to talk to one tailnet. Built by tailctl-config from a
// profile, or directly by embedders and tests.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tailctl_api::{
    ApiClient, MetricsSink, NoopMetrics, RateLimitConfig, RetryPolicy, TlsMode, TransportConfig,
};
use url::Url;

use crate::error::CoreError;
use crate::liveness::LivenessPolicy;

pub const DEFAULT_BASE_URL: &str = "https://api.tailscale.com";

/// Connection and behaviour settings for a tailnet client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    /// Tailnet name, or `"-"` for the API key's default tailnet.
    pub tailnet: String,
    pub api_key: SecretString,
    pub tls: TlsMode,
    pub timeout: Duration,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryPolicy,
    pub liveness: LivenessPolicy,
}

impl ClientConfig {
    /// Config with defaults for everything but the credential.
    pub fn new(api_key: SecretString) -> Result<Self, CoreError> {
        let base_url = Url::parse(DEFAULT_BASE_URL)
            .map_err(|e| CoreError::validation("base_url", e.to_string()))?;
        Ok(Self {
            base_url,
            tailnet: "-".into(),
            api_key,
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            liveness: LivenessPolicy::default(),
        })
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: self.tls.clone(),
            timeout: self.timeout,
            ..TransportConfig::default()
        }
    }

    /// Build an [`ApiClient`] that reports to `metrics`.
    pub fn build_client_with_metrics(
        &self,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<ApiClient, CoreError> {
        Ok(ApiClient::builder(self.base_url.as_str(), self.tailnet.as_str())
            .api_key(self.api_key.clone())
            .transport(self.transport())
            .rate_limit(self.rate_limit.clone())
            .retry(self.retry.clone())
            .metrics(metrics)
            .build()?)
    }

    pub fn build_client(&self) -> Result<ApiClient, CoreError> {
        self.build_client_with_metrics(Arc::new(NoopMetrics))
    }
}
