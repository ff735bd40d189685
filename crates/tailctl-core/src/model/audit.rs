// ── Configuration audit events ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What an audit event acted on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTarget {
    pub kind: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
}

/// One configuration change recorded by the control plane. Read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: Option<DateTime<Utc>>,
    /// Login name of the actor, falling back to its id.
    pub actor: Option<String>,
    pub action: String,
    pub target: AuditTarget,
    pub origin: Option<String>,
}
