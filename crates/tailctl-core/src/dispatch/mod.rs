// ── Operation dispatcher ──
//
// Routes `(tool, operation, params)` to the operations modules. Each tool
// is an enum with one variant per operation; the variant declares its
// parameters, which are checked before any handler runs. Results are
// wrapped as `{"tool", "operation", "result"}`.

mod device;
mod network;
mod params;
mod policy;
mod reporting;
mod security;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{Value, json};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, VariantNames};
use tailctl_api::MetricsSink;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::error::{CoreError, ErrorKind, RetryInfo};
use crate::ops::Operations;

pub use device::DeviceOp;
pub use network::NetworkOp;
pub use params::{ParamSpec, Params};
pub use policy::PolicyOp;
pub use reporting::ReportingOp;
pub use security::SecurityOp;

/// Largest page a listing operation returns.
pub const MAX_PAGE_SIZE: usize = 1000;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, VariantNames,
)]
#[strum(serialize_all = "snake_case")]
pub enum Tool {
    Device,
    Network,
    Policy,
    Security,
    Reporting,
}

impl Tool {
    pub fn description(self) -> &'static str {
        match self {
            Self::Device => "Device inventory and lifecycle, users and auth keys",
            Self::Network => "DNS settings and services",
            Self::Policy => "ACL policy: read, validate, update, rollback and analysis",
            Self::Security => "Audit logs, device compliance, connectivity and tags",
            Self::Reporting => "Network reports, exports and usage analytics",
        }
    }

    fn operations(self) -> Vec<OperationInfo> {
        match self {
            Self::Device => describe::<DeviceOp>(),
            Self::Network => describe::<NetworkOp>(),
            Self::Policy => describe::<PolicyOp>(),
            Self::Security => describe::<SecurityOp>(),
            Self::Reporting => describe::<ReportingOp>(),
        }
    }
}

/// One operation of a tool: its wire name, parameters and handler.
pub(crate) trait ToolOperation:
    Copy + FromStr + fmt::Display + VariantNames + IntoEnumIterator
{
    fn params(self) -> ParamSpec;

    fn run(
        self,
        ops: &Operations,
        params: &Params,
    ) -> impl Future<Output = Result<Value, CoreError>> + Send;
}

// ── Catalog ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationInfo {
    pub name: String,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: &'static str,
    pub operations: Vec<OperationInfo>,
}

fn describe<O: ToolOperation>() -> Vec<OperationInfo> {
    O::iter()
        .map(|op| {
            let spec = op.params();
            OperationInfo {
                name: op.to_string(),
                required: spec.required,
                optional: spec.optional,
            }
        })
        .collect()
}

/// Every tool with its operations and their parameters.
pub fn catalog() -> Vec<ToolInfo> {
    Tool::iter()
        .map(|tool| ToolInfo {
            name: tool.to_string(),
            description: tool.description(),
            operations: tool.operations(),
        })
        .collect()
}

// ── Errors ───────────────────────────────────────────────────────────

/// An operation failure with the invocation it came from.
#[derive(Debug, Error)]
#[error("{tool}.{operation}: {source}")]
pub struct ToolError {
    pub tool: String,
    pub operation: String,
    #[source]
    pub source: CoreError,
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    pub fn code(&self) -> &'static str {
        self.source.code()
    }

    /// The operation's error payload plus `tool` and `operation`.
    pub fn to_json(&self) -> Value {
        let mut body = self.source.to_json();
        body["tool"] = json!(self.tool);
        body["operation"] = json!(self.operation);
        body
    }
}

// ── Response shaping ─────────────────────────────────────────────────

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Value, CoreError> {
    serde_json::to_value(value).map_err(|e| CoreError::TransientServer {
        status: None,
        message: format!("could not encode result: {e}"),
        retry: RetryInfo::default(),
    })
}

/// Offset pagination over a listing, read from `limit` and `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Paging {
    offset: usize,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct Listing<T> {
    total: usize,
    offset: usize,
    count: usize,
    has_more: bool,
    items: Vec<T>,
}

impl Paging {
    pub(crate) fn from_params(params: &Params) -> Result<Self, CoreError> {
        let offset = params
            .opt_u64("offset")?
            .map_or(Ok(0), usize::try_from)
            .map_err(|_| CoreError::validation("offset", "is too large"))?;
        let limit = match params.opt_u32("limit")? {
            None => None,
            Some(n) => {
                let n = usize::try_from(n).unwrap_or(usize::MAX);
                if n == 0 || n > MAX_PAGE_SIZE {
                    return Err(CoreError::validation(
                        "limit",
                        format!("must be between 1 and {MAX_PAGE_SIZE}"),
                    ));
                }
                Some(n)
            }
        };
        Ok(Self { offset, limit })
    }

    /// One page of `items` with totals, in the original order.
    pub(crate) fn apply<T: Serialize>(self, items: Vec<T>) -> Result<Value, CoreError> {
        let total = items.len();
        let page: Vec<T> = items
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect();
        encode(&Listing {
            total,
            offset: self.offset,
            count: page.len(),
            has_more: self.offset.saturating_add(page.len()) < total,
            items: page,
        })
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────

/// Entry point for tool hosts.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    ops: Operations,
    metrics: Arc<dyn MetricsSink>,
}

impl Dispatcher {
    /// Dispatcher reporting to the client's metrics sink.
    pub fn new(ops: Operations) -> Self {
        let metrics = Arc::clone(ops.api().metrics());
        Self { ops, metrics }
    }

    /// Client, operations and dispatcher from one config.
    pub fn from_config(config: &ClientConfig) -> Result<Self, CoreError> {
        let api = config.build_client()?;
        Ok(Self::new(Operations::new(api, config.liveness)))
    }

    pub fn operations(&self) -> &Operations {
        &self.ops
    }

    pub async fn invoke(
        &self,
        tool: &str,
        operation: &str,
        params: Value,
    ) -> Result<Value, ToolError> {
        self.dispatch(&self.ops, tool, operation, params).await
    }

    /// Like [`invoke`](Self::invoke), aborting network calls, limiter waits
    /// and backoff sleeps once `cancel` fires.
    pub async fn invoke_with(
        &self,
        tool: &str,
        operation: &str,
        params: Value,
        cancel: CancellationToken,
    ) -> Result<Value, ToolError> {
        let ops = self.ops.with_cancellation(cancel);
        self.dispatch(&ops, tool, operation, params).await
    }

    async fn dispatch(
        &self,
        ops: &Operations,
        tool: &str,
        operation: &str,
        params: Value,
    ) -> Result<Value, ToolError> {
        let started = Instant::now();
        let result = route(ops, tool, operation, params).await;
        let elapsed = started.elapsed();
        self.metrics
            .record_dispatch(tool, operation, result.is_ok(), elapsed);

        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(payload) => {
                info!(tool, operation, duration_ms, "tool invocation succeeded");
                Ok(json!({
                    "tool": tool,
                    "operation": operation,
                    "result": payload,
                }))
            }
            Err(source) => {
                warn!(
                    tool,
                    operation,
                    duration_ms,
                    code = source.code(),
                    error = %source,
                    "tool invocation failed"
                );
                Err(ToolError {
                    tool: tool.to_owned(),
                    operation: operation.to_owned(),
                    source,
                })
            }
        }
    }
}

async fn route(
    ops: &Operations,
    tool: &str,
    operation: &str,
    params: Value,
) -> Result<Value, CoreError> {
    let parsed: Tool = tool.parse().map_err(|_| {
        CoreError::validation(
            "tool",
            format!(
                "unknown tool '{tool}'; expected one of: {}",
                Tool::VARIANTS.join(", ")
            ),
        )
    })?;
    let params = Params::from_value(params)?;
    match parsed {
        Tool::Device => run_operation::<DeviceOp>(ops, operation, &params).await,
        Tool::Network => run_operation::<NetworkOp>(ops, operation, &params).await,
        Tool::Policy => run_operation::<PolicyOp>(ops, operation, &params).await,
        Tool::Security => run_operation::<SecurityOp>(ops, operation, &params).await,
        Tool::Reporting => run_operation::<ReportingOp>(ops, operation, &params).await,
    }
}

async fn run_operation<O: ToolOperation>(
    ops: &Operations,
    operation: &str,
    params: &Params,
) -> Result<Value, CoreError> {
    let op: O = operation.parse().map_err(|_| {
        CoreError::validation(
            "operation",
            format!(
                "unknown operation '{operation}'; expected one of: {}",
                O::VARIANTS.join(", ")
            ),
        )
    })?;
    params.check(&op.params())?;
    op.run(ops, params).await
}
