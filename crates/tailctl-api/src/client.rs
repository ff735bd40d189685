// Async HTTP client for the tailnet-scoped v2 control-plane API.
//
// Base path: {base_url}/api/v2/tailnet/{tailnet}/
// Auth: `Authorization: Bearer <api key>` default header
//
// Every request passes through the per-family rate limiter and the retry
// policy. Endpoint methods live in `crate::endpoints` as `impl ApiClient`
// blocks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_stream::try_stream;
use futures_util::{Stream, TryStreamExt};
use reqwest::header::{AUTHORIZATION, ETAG, HeaderMap, HeaderValue, IF_MATCH, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::{Error, ErrorKind, FieldError};
use crate::observe::{MetricsSink, NoopMetrics, StatusClass};
use crate::rate_limit::{RateLimitConfig, RateLimiter, endpoint_family};
use crate::retry::{Idempotency, RetryPolicy};
use crate::transport::TransportConfig;

// ── Error response shape ─────────────────────────────────────────────

#[derive(Default, serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<FieldErrorResponse>,
}

#[derive(serde::Deserialize)]
struct FieldErrorResponse {
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// ── Request / response ───────────────────────────────────────────────

/// One logical API call, relative to the tailnet root.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    idempotency: Idempotency,
    if_match: Option<String>,
    idempotency_key: Option<String>,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>, idempotency: Idempotency) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            idempotency,
            if_match: None,
            idempotency_key: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path, Idempotency::Idempotent)
    }

    /// A `POST`; not retried unless the caller marks it [`idempotent`](Self::idempotent).
    pub fn post<B: Serialize + ?Sized>(path: impl Into<String>, body: &B) -> Result<Self, Error> {
        let mut request = Self::new(Method::POST, path, Idempotency::NonIdempotent);
        request.body = Some(serde_json::to_value(body)?);
        Ok(request)
    }

    /// A `DELETE`; not retried unless the caller marks it [`idempotent`](Self::idempotent).
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path, Idempotency::NonIdempotent)
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_owned(), value.into()));
        self
    }

    /// Assert that repeating this request has no additional effect.
    pub fn idempotent(mut self) -> Self {
        self.idempotency = Idempotency::Idempotent;
        self
    }

    /// Make the write conditional on the stored revision.
    pub fn if_match(mut self, etag: impl Into<String>) -> Self {
        self.if_match = Some(etag.into());
        self
    }

    /// Attach a client-generated key so the server can deduplicate
    /// replays, which makes the request safe to retry.
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self.idempotency = Idempotency::Idempotent;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn idempotency(&self) -> Idempotency {
        self.idempotency
    }
}

/// Successful response, body already read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub body: String,
}

/// One page of a cursor-paginated collection.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl ApiResponse {
    /// Decode the body; an empty body decodes as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let body = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        serde_json::from_str(body).map_err(|e| self.decode_error(&e))
    }

    /// Split a page body into the `collection` array and its `nextCursor`.
    /// A bare JSON array is accepted as a single, final page.
    pub fn page<T: DeserializeOwned>(&self, collection: &str) -> Result<Page<T>, Error> {
        let mut value: Value = self.json()?;
        let next_cursor = value
            .get("nextCursor")
            .and_then(Value::as_str)
            .map(str::to_owned);

        let items = match &mut value {
            Value::Array(items) => Value::Array(std::mem::take(items)),
            Value::Object(map) => map
                .remove(collection)
                .filter(|v| !v.is_null())
                .unwrap_or_else(|| Value::Array(Vec::new())),
            _ => Value::Array(Vec::new()),
        };

        let items = serde_json::from_value(items).map_err(|e| self.decode_error(&e))?;
        Ok(Page { items, next_cursor })
    }

    fn decode_error(&self, e: &serde_json::Error) -> Error {
        let preview: String = self.body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body: self.body.clone(),
        }
    }
}

// ── Client ───────────────────────────────────────────────────────────

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    limiter: RateLimiter,
    retry: RetryPolicy,
    metrics: Arc<dyn MetricsSink>,
}

/// Async client for one tailnet.
///
/// Cheap to clone; clones share the HTTP connection pool, the rate limiter
/// buckets and the metrics sink. Each clone carries its own cancellation
/// token (see [`with_cancellation`](Self::with_cancellation)).
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("limiter", &self.inner.limiter)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    base_url: String,
    tailnet: String,
    api_key: Option<SecretString>,
    http: Option<reqwest::Client>,
    transport: TransportConfig,
    rate_limit: RateLimitConfig,
    retry: RetryPolicy,
    metrics: Arc<dyn MetricsSink>,
}

impl ApiClientBuilder {
    pub fn api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Use an existing `reqwest::Client` (caller manages auth headers).
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> Result<ApiClient, Error> {
        let http = match self.http {
            Some(http) => http,
            None => {
                let mut headers = HeaderMap::new();
                if let Some(ref key) = self.api_key {
                    let mut value =
                        HeaderValue::from_str(&format!("Bearer {}", key.expose_secret()))
                            .map_err(|e| Error::Authentication {
                                message: format!("invalid API key header value: {e}"),
                            })?;
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                self.transport.build_client_with_headers(headers)?
            }
        };

        let base_url = ApiClient::tailnet_root(&self.base_url, &self.tailnet)?;

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                timeout: self.transport.timeout,
                limiter: RateLimiter::new(self.rate_limit),
                retry: self.retry,
                metrics: self.metrics,
            }),
            cancel: CancellationToken::new(),
        })
    }
}

impl ApiClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Start building a client for `tailnet` at `base_url`.
    ///
    /// `tailnet` may be `"-"` to address the API key's default tailnet.
    pub fn builder(base_url: impl Into<String>, tailnet: impl Into<String>) -> ApiClientBuilder {
        let tailnet = tailnet.into();
        ApiClientBuilder {
            base_url: base_url.into(),
            tailnet: if tailnet.trim().is_empty() {
                "-".to_owned()
            } else {
                tailnet
            },
            api_key: None,
            http: None,
            transport: TransportConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// A clone whose calls abort when `token` is cancelled.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            cancel: token,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.inner.metrics
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Build `{raw}/api/v2/tailnet/{tailnet}/`, tolerating a `raw` that
    /// already ends in `/api/v2`.
    fn tailnet_root(raw: &str, tailnet: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;

        let path = url.path().trim_end_matches('/').to_owned();
        let prefix = path.strip_suffix("/api/v2").unwrap_or(&path).to_owned();
        url.set_path(&prefix);

        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(["api", "v2", "tailnet", tailnet])
            .push("");

        Ok(url)
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.inner.base_url.join(path)?)
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Send `request` through the rate limiter and retry policy.
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        let endpoint = endpoint_family(&request.path);
        let started = Instant::now();
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let client = self;

        let result = self
            .inner
            .retry
            .execute(request.idempotency, &self.cancel, move |attempt| {
                counter.store(attempt, Ordering::Relaxed);
                client.attempt(request, endpoint, attempt)
            })
            .await;

        let attempts = attempts.load(Ordering::Relaxed);
        let duration_ms = started.elapsed().as_millis();
        match &result {
            Ok(response) => debug!(
                method = %request.method,
                path = %request.path,
                status = response.status,
                attempts,
                duration_ms,
                "request completed"
            ),
            Err(err) => {
                if matches!(err, Error::RetriesExhausted { .. }) {
                    self.inner.metrics.record_retries_exhausted(endpoint);
                }
                if err.kind() == ErrorKind::RateLimitExceeded {
                    self.inner.metrics.record_rate_limit_exceeded(endpoint);
                }
                debug!(
                    method = %request.method,
                    path = %request.path,
                    attempts,
                    duration_ms,
                    error = %err,
                    "request failed"
                );
            }
        }

        result
    }

    /// Execute and decode the JSON body.
    pub async fn fetch<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, Error> {
        self.execute(request).await?.json()
    }

    /// Execute, discarding any body.
    pub async fn send(&self, request: &ApiRequest) -> Result<(), Error> {
        self.execute(request).await.map(|_| ())
    }

    async fn attempt(
        &self,
        request: &ApiRequest,
        endpoint: &str,
        attempt: u32,
    ) -> Result<ApiResponse, Error> {
        let permit = self.inner.limiter.acquire(endpoint, &self.cancel).await?;
        let url = self.url(&request.path)?;

        let mut builder = self.inner.http.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        if let Some(ref etag) = request.if_match {
            builder = builder.header(IF_MATCH, etag.as_str());
        }
        if let Some(ref key) = request.idempotency_key {
            builder = builder.header("Idempotency-Key", key.as_str());
        }

        debug!(
            method = %request.method,
            path = %request.path,
            attempt,
            waited_ms = permit.waited.as_millis(),
            "sending request"
        );

        let started = Instant::now();
        let outcome = tokio::select! {
            () = self.cancel.cancelled() => return Err(Error::Cancelled),
            outcome = read_response(builder) => outcome,
        };
        let latency = started.elapsed();

        let (status, headers, body) = match outcome {
            Ok(parts) => parts,
            Err(e) => {
                self.inner
                    .metrics
                    .record_request(endpoint, StatusClass::Transport, latency);
                debug!(path = %request.path, attempt, error = %e, "transport failure");
                return Err(self.transport_error(e));
            }
        };

        self.inner
            .metrics
            .record_request(endpoint, StatusClass::from_status(status.as_u16()), latency);
        debug!(
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            attempt,
            duration_ms = latency.as_millis(),
            "response received"
        );

        if status.is_success() {
            let etag = headers
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            Ok(ApiResponse {
                status: status.as_u16(),
                etag,
                body,
            })
        } else {
            Err(error_for_status(status, &request.path, &headers, &body))
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                timeout_secs: self.inner.timeout.as_secs(),
            }
        } else {
            Error::Transport(e)
        }
    }

    // ── Pagination ───────────────────────────────────────────────────

    /// Lazily walk a cursor-paginated collection, one page per item.
    ///
    /// The stream ends after the last page or on the first error, and stops
    /// early if the server repeats a cursor. Calling again restarts from
    /// the first page.
    pub fn pages<T>(
        &self,
        request: ApiRequest,
        collection: &'static str,
    ) -> impl Stream<Item = Result<Vec<T>, Error>> + Send + '_
    where
        T: DeserializeOwned + Send + 'static,
    {
        try_stream! {
            let mut cursor: Option<String> = None;
            loop {
                let mut page_request = request.clone();
                if let Some(ref c) = cursor {
                    page_request = page_request.query("cursor", c.clone());
                }

                let response = self.execute(&page_request).await?;
                let page: Page<T> = response.page(collection)?;
                yield page.items;

                match page.next_cursor {
                    Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                        cursor = Some(next);
                    }
                    _ => break,
                }
            }
        }
    }

    /// Collect every page of a paginated collection.
    pub async fn collect_all<T>(
        &self,
        request: ApiRequest,
        collection: &'static str,
    ) -> Result<Vec<T>, Error>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let stream = self.pages::<T>(request, collection);
        futures_util::pin_mut!(stream);

        let mut all = Vec::new();
        while let Some(page) = stream.try_next().await? {
            all.extend(page);
        }
        Ok(all)
    }
}

async fn read_response(
    builder: reqwest::RequestBuilder,
) -> Result<(StatusCode, HeaderMap, String), reqwest::Error> {
    let resp = builder.send().await?;
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.text().await?;
    Ok((status, headers, body))
}

// ── Status mapping ───────────────────────────────────────────────────

fn error_for_status(status: StatusCode, path: &str, headers: &HeaderMap, body: &str) -> Error {
    let parsed: ErrorResponse = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body.chars().take(200).collect()
            }
        });
    let code = status.as_u16();

    match code {
        401 => Error::Authentication { message },
        403 => Error::Authorization { message },
        404 => Error::NotFound {
            path: path.to_owned(),
        },
        400 | 422 => Error::Validation {
            status: code,
            message,
            fields: parsed
                .errors
                .into_iter()
                .map(|e| FieldError {
                    field: e.field.unwrap_or_default(),
                    message: e.message.unwrap_or_default(),
                })
                .collect(),
        },
        409 | 412 => Error::Conflict {
            status: code,
            message,
        },
        429 => Error::RateLimited {
            retry_after: parse_retry_after(headers),
        },
        500..=599 => Error::Server {
            status: code,
            message,
        },
        _ => Error::UnexpectedStatus {
            status: code,
            message,
        },
    }
}

/// `Retry-After` in delta-seconds form; HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
