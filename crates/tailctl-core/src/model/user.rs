// ── User domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, VariantNames};

/// Tailnet role. Wire names are kebab-case (`it-admin`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, VariantNames,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum UserRole {
    Owner,
    Admin,
    ItAdmin,
    NetworkAdmin,
    BillingAdmin,
    Auditor,
    Member,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub login_name: String,
    pub display_name: Option<String>,
    /// `None` when the server reports a role this client does not know.
    pub role: Option<UserRole>,
    pub status: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    /// Devices owned by this user, matched by login name. Only filled when
    /// requested; these are weak references, re-resolve before acting.
    pub device_ids: Vec<String>,
}
