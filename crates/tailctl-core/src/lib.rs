//! Domain layer between `tailctl-api` and tool hosts (CLI, agents).
//!
//! - **[`Operations`]**: one module per concern (devices, DNS, services,
//!   policies, audit, tags, keys, users, policy analysis, analytics,
//!   reporting), each holding an injected [`ApiClient`](tailctl_api::ApiClient).
//!   Reads always go to the control plane; nothing is cached.
//!
//! - **[`Dispatcher`]**: routes `(tool, operation, params)` invocations to
//!   the operations modules, checking parameters before any network call
//!   and wrapping failures in [`ToolError`].
//!
//! - **Domain model** ([`model`]): owned `Device`, `NetworkPolicy`, `User`,
//!   `AuthKey`, `Service` and `AuditEvent` values converted from wire types.
//!
//! - **Liveness** ([`liveness::is_online`]): the online/offline rule for
//!   devices, a pure function of connection flag, last check-in and window.

pub mod config;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod liveness;
pub mod model;
pub mod ops;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::ClientConfig;
pub use dispatch::{Dispatcher, ParamSpec, Params, Tool, ToolError, ToolInfo, catalog};
pub use error::{CoreError, ErrorKind, FieldIssue, RetryInfo};
pub use liveness::{LivenessPolicy, is_online};
pub use ops::Operations;

pub use model::{
    AclRule, AuditEvent, AuthKey, CreatedKey, Device, DeviceStatus, DnsConfig, KeyState,
    NetworkPolicy, PolicyDocument, Protocol, RuleAction, Service, ServiceEndpoint, ServiceSpec,
    TagValidation, User, UserRole, ValidationState,
};
