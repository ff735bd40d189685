// ── Policy analysis ──

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CoreError;
use crate::model::{Device, PolicyDocument, RuleAction};
use crate::ops::audit::Severity;
use crate::ops::devices::DeviceOps;
use crate::ops::policies::{MatchedRule, PolicyOps};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub kind: &'static str,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PolicyAnalysis {
    pub revision: Option<String>,
    pub rules: usize,
    pub accept_rules: usize,
    pub reject_rules: usize,
    pub other_rules: usize,
    pub wildcard_rules: usize,
    pub hosts: usize,
    pub groups: usize,
    pub tag_owners: usize,
    pub recommendations: Vec<Recommendation>,
}

fn is_wildcard_rule(rule: &crate::model::AclRule) -> bool {
    rule.src.iter().any(|s| s == "*") || rule.dst.iter().any(|d| d.starts_with("*:"))
}

pub fn analyze_document(doc: &PolicyDocument) -> PolicyAnalysis {
    let mut analysis = PolicyAnalysis {
        rules: doc.rules.len(),
        hosts: doc.hosts.len(),
        groups: doc.groups.len(),
        tag_owners: doc.tag_owners.len(),
        ..PolicyAnalysis::default()
    };
    for rule in &doc.rules {
        match rule.action {
            RuleAction::Accept => analysis.accept_rules += 1,
            RuleAction::Reject => analysis.reject_rules += 1,
            RuleAction::Other(_) => analysis.other_rules += 1,
        }
        analysis.wildcard_rules += usize::from(is_wildcard_rule(rule));
    }

    if analysis.rules == 0 {
        analysis.recommendations.push(Recommendation {
            kind: "configuration",
            severity: Severity::High,
            message: "no ACL rules defined; all traffic is denied".into(),
        });
    }
    if analysis.wildcard_rules * 2 > analysis.rules {
        analysis.recommendations.push(Recommendation {
            kind: "security",
            severity: Severity::Medium,
            message: format!(
                "{} of {} rules use wildcards; prefer specific groups and tags",
                analysis.wildcard_rules, analysis.rules
            ),
        });
    }
    if analysis.tag_owners == 0 && analysis.rules > 5 {
        analysis.recommendations.push(Recommendation {
            kind: "best_practice",
            severity: Severity::Low,
            message: "no tag owners defined; consider tagging servers instead of per-user rules"
                .into(),
        });
    }
    analysis
}

// ── Device impact ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceAccess {
    pub device_id: String,
    pub device_name: String,
    pub tags: Vec<String>,
    pub rules: Vec<MatchedRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AffectedDevices {
    pub action: Option<RuleAction>,
    pub total_devices: usize,
    pub devices_affected: usize,
    pub devices: Vec<DeviceAccess>,
}

/// Whether a source selector covers a device: wildcard, one of its tags,
/// its owner (directly or through a group), or one of its addresses.
fn source_covers(doc: &PolicyDocument, selector: &str, device: &Device) -> bool {
    if selector == "*" || device.has_tag(selector) {
        return true;
    }
    let owned_by = |login: &str| device.user.as_deref() == Some(login);
    if owned_by(selector) {
        return true;
    }
    if let Some(members) = doc.groups.get(selector) {
        if members.iter().any(|m| owned_by(m)) {
            return true;
        }
    }
    let addr = doc.hosts.get(selector).map_or(selector, String::as_str);
    device.addresses.iter().any(|ip| ip.to_string() == addr)
}

pub fn affected_devices(
    doc: &PolicyDocument,
    devices: &[Device],
    action: Option<&RuleAction>,
) -> AffectedDevices {
    let access: Vec<DeviceAccess> = devices
        .iter()
        .map(|device| DeviceAccess {
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            tags: device.tags.iter().cloned().collect(),
            rules: doc
                .rules
                .iter()
                .enumerate()
                .filter(|(_, r)| action.is_none_or(|a| *a == r.action))
                .filter(|(_, r)| r.src.iter().any(|s| source_covers(doc, s, device)))
                .map(|(index, rule)| MatchedRule {
                    index,
                    rule: rule.clone(),
                })
                .collect(),
        })
        .collect();

    AffectedDevices {
        action: action.cloned(),
        total_devices: devices.len(),
        devices_affected: access.iter().filter(|d| !d.rules.is_empty()).count(),
        devices: access,
    }
}

// ── Rule query ───────────────────────────────────────────────────────

/// Criteria for selecting rules. All set criteria must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyQuery {
    pub action: Option<RuleAction>,
    pub src_contains: Option<String>,
    pub dst_contains: Option<String>,
    #[serde(default)]
    pub has_src: bool,
    #[serde(default)]
    pub has_dst: bool,
}

impl PolicyQuery {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn run(&self, doc: &PolicyDocument) -> Vec<MatchedRule> {
        doc.rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| {
                self.action.as_ref().is_none_or(|a| *a == rule.action)
                    && self
                        .src_contains
                        .as_deref()
                        .is_none_or(|needle| rule.src.iter().any(|s| s.contains(needle)))
                    && self
                        .dst_contains
                        .as_deref()
                        .is_none_or(|needle| rule.dst.iter().any(|d| d.contains(needle)))
                    && (!self.has_src || !rule.src.is_empty())
                    && (!self.has_dst || !rule.dst.is_empty())
            })
            .map(|(index, rule)| MatchedRule {
                index,
                rule: rule.clone(),
            })
            .collect()
    }
}

// ── Operations ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PolicyAnalysisOps {
    policies: PolicyOps,
    devices: DeviceOps,
}

impl PolicyAnalysisOps {
    pub fn new(policies: PolicyOps, devices: DeviceOps) -> Self {
        Self { policies, devices }
    }

    pub async fn analyze(&self) -> Result<PolicyAnalysis, CoreError> {
        let policy = self.policies.get().await?;
        let mut analysis = analyze_document(&policy.document);
        analysis.revision = policy.revision;
        info!(
            rules = analysis.rules,
            recommendations = analysis.recommendations.len(),
            "policy analyzed"
        );
        Ok(analysis)
    }

    /// Devices each rule's sources cover, optionally only rules with `action`.
    pub async fn affected_devices(
        &self,
        action: Option<&RuleAction>,
    ) -> Result<AffectedDevices, CoreError> {
        let (policy, devices) = tokio::try_join!(self.policies.get(), self.devices.all())?;
        Ok(affected_devices(&policy.document, &devices, action))
    }

    pub async fn query(&self, query: &PolicyQuery) -> Result<Vec<MatchedRule>, CoreError> {
        if query.is_empty() {
            return Err(CoreError::validation(
                "query",
                "at least one criterion is required",
            ));
        }
        let policy = self.policies.get().await?;
        Ok(query.run(&policy.document))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::BTreeSet;

    use serde_json::json;

    use super::*;
    use crate::model::DeviceStatus;

    fn doc() -> PolicyDocument {
        serde_json::from_value(json!({
            "groups": {"group:eng": ["alice@example.com"]},
            "hosts": {"nas": "100.64.0.7"},
            "acls": [
                {"action": "accept", "src": ["group:eng"], "dst": ["tag:db:5432"]},
                {"action": "accept", "src": ["*"], "dst": ["*:*"]},
                {"action": "accept", "src": ["nas"], "dst": ["tag:backup:22"]}
            ]
        }))
        .unwrap()
    }

    fn device(id: &str, user: &str, addr: &str) -> Device {
        Device {
            id: id.into(),
            node_id: None,
            name: id.into(),
            hostname: None,
            os: None,
            addresses: [addr.parse().unwrap()].into(),
            authorized: true,
            tags: BTreeSet::new(),
            last_seen: None,
            connected_to_control: true,
            status: DeviceStatus::Online,
            is_exit_node: false,
            is_subnet_router: false,
            user: Some(user.into()),
            client_version: None,
            update_available: false,
            key_expiry: None,
            key_expiry_disabled: false,
            advertised_routes: Vec::new(),
            enabled_routes: Vec::new(),
        }
    }

    #[test]
    fn analysis_counts_and_recommends() {
        let analysis = analyze_document(&doc());
        assert_eq!(analysis.rules, 3);
        assert_eq!(analysis.accept_rules, 3);
        assert_eq!(analysis.wildcard_rules, 1);
        assert!(analysis.recommendations.is_empty());

        let empty = analyze_document(&PolicyDocument::default());
        assert_eq!(empty.recommendations[0].severity, Severity::High);
    }

    #[test]
    fn sources_cover_groups_hosts_and_wildcards() {
        let devices = [
            device("laptop", "alice@example.com", "100.64.0.2"),
            device("nas", "svc@example.com", "100.64.0.7"),
        ];
        let result = affected_devices(&doc(), &devices, None);
        let indexes: Vec<Vec<usize>> = result
            .devices
            .iter()
            .map(|d| d.rules.iter().map(|r| r.index).collect())
            .collect();
        assert_eq!(indexes, vec![vec![0, 1], vec![1, 2]]);
        assert_eq!(result.devices_affected, 2);
    }

    #[test]
    fn query_combines_criteria() {
        let query = PolicyQuery {
            dst_contains: Some("tag:".into()),
            src_contains: Some("group:".into()),
            ..PolicyQuery::default()
        };
        let hits = query.run(&doc());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 0);
    }
}
