// Wire types for the control-plane v2 REST API.
//
// Field names follow the API's camelCase JSON. Everything optional on the
// wire is `#[serde(default)]` so partially populated records still decode;
// `tailctl-core` converts these into domain models.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ── Helpers ──────────────────────────────────────────────────────────

/// Accept RFC 3339 strings, treating empty strings, the zero time and
/// unparsable values as absent.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    use chrono::Datelike;

    let parsed = DateTime::parse_from_rfc3339(raw.trim()).ok()?;
    let utc = parsed.with_timezone(&Utc);
    (utc.year() > 1).then_some(utc)
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    pub id: String,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub authorized: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub connected_to_control: bool,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub client_version: Option<String>,
    #[serde(default)]
    pub update_available: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub key_expiry_disabled: bool,
    #[serde(default)]
    pub advertised_routes: Vec<String>,
    #[serde(default)]
    pub enabled_routes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRoutesResponse {
    #[serde(default)]
    pub advertised_routes: Vec<String>,
    #[serde(default)]
    pub enabled_routes: Vec<String>,
}

// ── ACL policy ───────────────────────────────────────────────────────

/// ACL policy document as stored by the control plane.
///
/// Sections without a typed field are kept in `extra` and written back
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AclPolicyBody {
    #[serde(default, alias = "ACLs")]
    pub acls: Vec<AclRuleBody>,
    #[serde(default, alias = "Hosts", skip_serializing_if = "IndexMap::is_empty")]
    pub hosts: IndexMap<String, String>,
    #[serde(default, alias = "Groups", skip_serializing_if = "IndexMap::is_empty")]
    pub groups: IndexMap<String, Vec<String>>,
    #[serde(default, alias = "TagOwners", skip_serializing_if = "IndexMap::is_empty")]
    pub tag_owners: IndexMap<String, Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRuleBody {
    #[serde(default, alias = "Action")]
    pub action: String,
    #[serde(default, alias = "Src")]
    pub src: Vec<String>,
    #[serde(default, alias = "Dst")]
    pub dst: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<String>,
}

/// Policy document together with its revision tag.
#[derive(Debug, Clone, PartialEq)]
pub struct AclDocument {
    pub policy: AclPolicyBody,
    /// `ETag` of the stored document, if the server sent one.
    pub etag: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AclValidateResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Vec<AclValidateDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AclValidateDetail {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

// ── DNS ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameserversBody {
    #[serde(default)]
    pub dns: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsPreferencesBody {
    #[serde(default, rename = "magicDNS")]
    pub magic_dns: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPathsBody {
    #[serde(default)]
    pub search_paths: Vec<String>,
}

// ── Services ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub addrs: Vec<String>,
    #[serde(default, rename = "tailvipIPv4")]
    pub tailvip_ipv4: Option<String>,
    #[serde(default, rename = "tailvipIPv6")]
    pub tailvip_ipv6: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub endpoints: Vec<ServiceEndpointBody>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpointBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default)]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceRequestBody {
    pub name: String,
    pub tags: Vec<String>,
    pub endpoints: Vec<ServiceEndpointBody>,
}

// ── Auth keys ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResponse {
    pub id: String,
    /// Secret key material; only present in the create response.
    #[serde(default, skip_serializing)]
    pub key: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub revoked: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub invalid: bool,
    #[serde(default)]
    pub capabilities: KeyCapabilities,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCapabilities {
    #[serde(default)]
    pub devices: KeyDeviceCapabilities,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDeviceCapabilities {
    #[serde(default)]
    pub create: KeyCreateCapabilities,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCreateCapabilities {
    #[serde(default)]
    pub reusable: bool,
    #[serde(default)]
    pub ephemeral: bool,
    #[serde(default)]
    pub preauthorized: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyBody {
    pub capabilities: KeyCapabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ── Users ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    #[serde(default)]
    pub login_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub device_count: Option<u32>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_seen: Option<DateTime<Utc>>,
}

// ── Configuration audit log ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogResponse {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actor: Option<AuditActorBody>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub target: Option<AuditTargetBody>,
    #[serde(default, rename = "eventGroupID")]
    pub event_group_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditActorBody {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub login_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditTargetBody {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub property: Option<String>,
}
