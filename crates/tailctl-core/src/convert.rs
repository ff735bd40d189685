// ── API-to-domain type conversions ──
//
// Bridges raw `tailctl_api::types` records into `tailctl_core::model`
// values. Missing optional data gets a sensible default; values that fail
// to parse are dropped with a warning rather than failing the whole record.

use std::collections::BTreeSet;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use tracing::warn;

use tailctl_api::types::{
    AclPolicyBody, AclRuleBody, AuditLogResponse, DeviceResponse, KeyResponse, ServiceEndpointBody,
    ServiceRequestBody, ServiceResponse, UserResponse,
};

use crate::liveness::LivenessPolicy;
use crate::model::{
    AclRule, AuditEvent, AuditTarget, AuthKey, Device, DeviceStatus, KeyState, PolicyDocument,
    Protocol, RuleAction, Service, ServiceEndpoint, ServiceSpec, User, is_exit_route,
};

// ── Device ─────────────────────────────────────────────────────────

fn parse_addresses(device_id: &str, raw: &[String]) -> BTreeSet<IpAddr> {
    raw.iter()
        .filter_map(|addr| match addr.parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(_) => {
                warn!(device_id, address = %addr, "skipping unparsable device address");
                None
            }
        })
        .collect()
}

/// Convert a wire device, deriving its status at `now`.
pub fn device_from_wire(raw: DeviceResponse, now: DateTime<Utc>, liveness: LivenessPolicy) -> Device {
    let status = DeviceStatus::classify(
        raw.authorized,
        raw.connected_to_control,
        raw.last_seen,
        now,
        liveness,
    );
    let is_exit_node = raw.enabled_routes.iter().any(|r| is_exit_route(r));
    let is_subnet_router = raw.enabled_routes.iter().any(|r| !is_exit_route(r));
    let addresses = parse_addresses(&raw.id, &raw.addresses);

    Device {
        name: raw
            .name
            .or_else(|| raw.hostname.clone())
            .unwrap_or_else(|| raw.id.clone()),
        id: raw.id,
        node_id: raw.node_id,
        hostname: raw.hostname,
        os: raw.os,
        addresses,
        authorized: raw.authorized,
        tags: raw.tags.into_iter().collect(),
        last_seen: raw.last_seen,
        connected_to_control: raw.connected_to_control,
        status,
        is_exit_node,
        is_subnet_router,
        user: raw.user,
        client_version: raw.client_version,
        update_available: raw.update_available,
        key_expiry: raw.expires,
        key_expiry_disabled: raw.key_expiry_disabled,
        advertised_routes: raw.advertised_routes,
        enabled_routes: raw.enabled_routes,
    }
}

// ── Policy ─────────────────────────────────────────────────────────

impl From<AclRuleBody> for AclRule {
    fn from(raw: AclRuleBody) -> Self {
        Self {
            action: RuleAction::parse(&raw.action),
            src: raw.src,
            dst: raw.dst,
            proto: raw.proto,
        }
    }
}

impl From<AclRule> for AclRuleBody {
    fn from(rule: AclRule) -> Self {
        Self {
            action: rule.action.as_str().to_owned(),
            src: rule.src,
            dst: rule.dst,
            proto: rule.proto,
        }
    }
}

impl From<AclPolicyBody> for PolicyDocument {
    fn from(raw: AclPolicyBody) -> Self {
        Self {
            rules: raw.acls.into_iter().map(AclRule::from).collect(),
            hosts: raw.hosts,
            groups: raw.groups,
            tag_owners: raw.tag_owners,
            extra: raw.extra,
        }
    }
}

impl From<PolicyDocument> for AclPolicyBody {
    fn from(doc: PolicyDocument) -> Self {
        Self {
            acls: doc.rules.into_iter().map(AclRuleBody::from).collect(),
            hosts: doc.hosts,
            groups: doc.groups,
            tag_owners: doc.tag_owners,
            extra: doc.extra,
        }
    }
}

// ── Users ──────────────────────────────────────────────────────────

impl From<UserResponse> for User {
    fn from(raw: UserResponse) -> Self {
        let role = raw.role.as_deref().and_then(|r| r.parse().ok());
        Self {
            login_name: raw.login_name.unwrap_or_else(|| raw.id.clone()),
            id: raw.id,
            display_name: raw.display_name,
            role,
            status: raw.status,
            last_seen: raw.last_seen,
            device_ids: Vec::new(),
        }
    }
}

// ── Keys ───────────────────────────────────────────────────────────

/// Convert a wire key; `invalid` keys are treated as revoked.
pub fn key_from_wire(raw: KeyResponse, now: DateTime<Utc>) -> AuthKey {
    let state = if raw.revoked.is_some() || raw.invalid {
        KeyState::Revoked
    } else if raw.expires.is_some_and(|exp| exp <= now) {
        KeyState::Expired
    } else {
        KeyState::Active
    };
    let create = raw.capabilities.devices.create;

    AuthKey {
        id: raw.id,
        description: raw.description.filter(|d| !d.is_empty()),
        created: raw.created,
        expires: raw.expires,
        last_used: raw.last_used,
        reusable: create.reusable,
        ephemeral: create.ephemeral,
        preauthorized: create.preauthorized,
        tags: create.tags,
        state,
    }
}

// ── Services ───────────────────────────────────────────────────────

fn endpoint_from_wire(service_id: &str, raw: ServiceEndpointBody) -> Option<ServiceEndpoint> {
    let host = raw.host.or(raw.ip).or(raw.device_id)?;
    let protocol = match raw.protocol.as_deref() {
        None | Some("") => Protocol::default(),
        Some(p) => match p.parse() {
            Ok(protocol) => protocol,
            Err(_) => {
                warn!(service_id, protocol = p, "skipping endpoint with unknown protocol");
                return None;
            }
        },
    };
    Some(ServiceEndpoint {
        host,
        port: raw.port,
        protocol,
    })
}

impl From<ServiceResponse> for Service {
    fn from(raw: ServiceResponse) -> Self {
        let mut addresses = Vec::new();
        for addr in raw
            .tailvip_ipv4
            .into_iter()
            .chain(raw.tailvip_ipv6)
            .chain(raw.addrs)
        {
            if !addr.is_empty() && !addresses.contains(&addr) {
                addresses.push(addr);
            }
        }
        let endpoints = raw
            .endpoints
            .into_iter()
            .filter_map(|e| endpoint_from_wire(&raw.id, e))
            .collect();

        Self {
            name: raw.name.unwrap_or_else(|| raw.id.clone()),
            id: raw.id,
            addresses,
            endpoints,
            tags: raw.tags,
        }
    }
}

impl From<&ServiceSpec> for ServiceRequestBody {
    fn from(spec: &ServiceSpec) -> Self {
        Self {
            name: spec.name.clone(),
            tags: spec.tags.clone(),
            endpoints: spec
                .endpoints
                .iter()
                .map(|e| ServiceEndpointBody {
                    host: Some(e.host.clone()),
                    port: e.port,
                    protocol: Some(e.protocol.to_string()),
                    ..ServiceEndpointBody::default()
                })
                .collect(),
        }
    }
}

// ── Audit log ──────────────────────────────────────────────────────

impl From<AuditLogResponse> for AuditEvent {
    fn from(raw: AuditLogResponse) -> Self {
        let actor = raw
            .actor
            .and_then(|a| a.login_name.or(a.display_name).or(a.id));
        let target = raw.target.map_or_else(AuditTarget::default, |t| AuditTarget {
            kind: t.kind,
            id: t.id,
            name: t.name,
        });
        Self {
            timestamp: raw.event_time,
            actor,
            action: raw.action.unwrap_or_default(),
            target,
            origin: raw.origin,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::TimeDelta;
    use serde_json::json;

    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-16T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn wire(value: serde_json::Value) -> DeviceResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn device_status_and_routes_are_derived() {
        let seen = (now() - TimeDelta::minutes(5)).to_rfc3339();
        let device = device_from_wire(
            wire(json!({
                "id": "n1",
                "name": "gw.example.ts.net",
                "addresses": ["100.64.0.1", "fd7a:115c:a1e0::1", "garbage"],
                "authorized": true,
                "connectedToControl": true,
                "lastSeen": seen,
                "enabledRoutes": ["0.0.0.0/0", "::/0", "10.0.0.0/24"]
            })),
            now(),
            LivenessPolicy::default(),
        );

        assert_eq!(device.status, DeviceStatus::Online);
        assert_eq!(device.addresses.len(), 2);
        assert!(device.is_exit_node);
        assert!(device.is_subnet_router);
        assert_eq!(device.short_name(), "gw");
    }

    #[test]
    fn unauthorized_wins_over_liveness() {
        let device = device_from_wire(
            wire(json!({"id": "n2", "authorized": false, "connectedToControl": true})),
            now(),
            LivenessPolicy::default(),
        );
        assert_eq!(device.status, DeviceStatus::Unauthorized);
    }

    #[test]
    fn never_seen_is_unknown() {
        let device = device_from_wire(
            wire(json!({"id": "n3", "authorized": true})),
            now(),
            LivenessPolicy::default(),
        );
        assert_eq!(device.status, DeviceStatus::Unknown);
        assert_eq!(device.name, "n3");
    }

    #[test]
    fn policy_round_trips_through_domain() {
        let raw: AclPolicyBody = serde_json::from_value(json!({
            "acls": [{"action": "accept", "src": ["*"], "dst": ["*:*"]}],
            "groups": {"group:eng": ["alice@example.com"]},
            "ssh": []
        }))
        .unwrap();
        let back = AclPolicyBody::from(PolicyDocument::from(raw.clone()));
        assert_eq!(back, raw);
    }

    #[test]
    fn revoked_and_invalid_keys_are_revoked() {
        let revoked: KeyResponse =
            serde_json::from_value(json!({"id": "k1", "revoked": "2026-01-01T00:00:00Z"}))
                .unwrap();
        assert_eq!(key_from_wire(revoked, now()).state, KeyState::Revoked);

        let invalid: KeyResponse =
            serde_json::from_value(json!({"id": "k2", "invalid": true})).unwrap();
        assert_eq!(key_from_wire(invalid, now()).state, KeyState::Revoked);

        let expired: KeyResponse =
            serde_json::from_value(json!({"id": "k3", "expires": "2026-01-01T00:00:00Z"}))
                .unwrap();
        assert_eq!(key_from_wire(expired, now()).state, KeyState::Expired);
    }
}
