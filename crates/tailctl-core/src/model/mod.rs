// ── Domain model ──
//
// Owned values returned to callers. Nothing here is cached; every read
// re-fetches from the control plane.

pub mod audit;
pub mod device;
pub mod dns;
pub mod key;
pub mod policy;
pub mod service;
pub mod tag;
pub mod user;

pub use audit::{AuditEvent, AuditTarget};
pub use device::{Device, DeviceStatus, EXIT_ROUTES, is_exit_route};
pub use dns::DnsConfig;
pub use key::{AuthKey, CreatedKey, KeyState};
pub use policy::{AclRule, NetworkPolicy, PolicyDocument, RuleAction, ValidationState};
pub use service::{Protocol, Service, ServiceEndpoint, ServiceSpec};
pub use tag::{TagValidation, validate_tag_name};
pub use user::{User, UserRole};
