// ── Policy operations ──
//
// Updates follow validate → snapshot → apply. The snapshot is the stored
// document just before the last successful (or partially applied) update
// and backs a single rollback step. It lives behind an async mutex shared
// by every clone, which also serializes concurrent updates.

use std::sync::Arc;

use serde::Serialize;
use tailctl_api::ApiClient;
use tailctl_api::types::AclPolicyBody;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{CoreError, FieldIssue};
use crate::model::{AclRule, NetworkPolicy, PolicyDocument, RuleAction, ValidationState};

// ── Local structural checks ──────────────────────────────────────────

#[derive(Debug, Default)]
struct LocalCheck {
    errors: Vec<FieldIssue>,
    warnings: Vec<String>,
}

fn check_document(doc: &PolicyDocument) -> LocalCheck {
    let mut check = LocalCheck::default();

    if doc.rules.is_empty() {
        check
            .warnings
            .push("policy has no rules; all traffic will be denied".into());
    }
    for (i, rule) in doc.rules.iter().enumerate() {
        match &rule.action {
            RuleAction::Accept => {}
            RuleAction::Reject => check
                .warnings
                .push(format!("acls[{i}]: reject rules are redundant with default deny")),
            RuleAction::Other(raw) if raw.trim().is_empty() => check
                .errors
                .push(FieldIssue::new(format!("acls[{i}].action"), "missing action")),
            RuleAction::Other(raw) => check
                .warnings
                .push(format!("acls[{i}]: non-standard action '{raw}'")),
        }
        if rule.src.is_empty() {
            check.errors.push(FieldIssue::new(
                format!("acls[{i}].src"),
                "must list at least one source",
            ));
        }
        if rule.dst.is_empty() {
            check.errors.push(FieldIssue::new(
                format!("acls[{i}].dst"),
                "must list at least one destination",
            ));
        }
        for (j, dst) in rule.dst.iter().enumerate() {
            if split_destination(dst).is_none() {
                check.errors.push(FieldIssue::new(
                    format!("acls[{i}].dst[{j}]"),
                    format!("'{dst}' must be of the form target:ports"),
                ));
            }
        }
    }
    for name in doc.groups.keys() {
        if !name.starts_with("group:") {
            check.errors.push(FieldIssue::new(
                format!("groups.{name}"),
                "group names must start with 'group:'",
            ));
        }
    }
    for name in doc.tag_owners.keys() {
        if !name.starts_with("tag:") {
            check.errors.push(FieldIssue::new(
                format!("tagOwners.{name}"),
                "tag names must start with 'tag:'",
            ));
        }
    }
    check
}

fn split_destination(dst: &str) -> Option<(&str, &str)> {
    let (target, ports) = dst.rsplit_once(':')?;
    (!target.is_empty() && !ports.is_empty()).then_some((target, ports))
}

// ── Access evaluation ────────────────────────────────────────────────

/// A rule that matched an access test, with its position in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedRule {
    pub index: usize,
    pub rule: AclRule,
}

/// Result of evaluating `src → dst[:port]` against a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub src: String,
    pub dst: String,
    pub port: Option<u16>,
    /// Action of the last matching rule, `reject` when none matched.
    pub decision: RuleAction,
    pub matched_rules: Vec<MatchedRule>,
}

impl AccessDecision {
    pub fn allowed(&self) -> bool {
        self.decision == RuleAction::Accept
    }
}

/// Whether a policy selector names `subject`, directly, through a group
/// or through a host alias.
fn selector_matches(doc: &PolicyDocument, selector: &str, subject: &str) -> bool {
    if selector == "*" || selector == subject {
        return true;
    }
    if let Some(members) = doc.groups.get(selector) {
        if members.iter().any(|m| m == subject) {
            return true;
        }
    }
    doc.hosts.get(selector).is_some_and(|addr| addr == subject)
        || doc.hosts.get(subject).is_some_and(|addr| addr == selector)
}

fn port_matches(spec: &str, port: Option<u16>) -> bool {
    let Some(port) = port else {
        return true;
    };
    spec.split(',').map(str::trim).any(|part| {
        if part == "*" {
            return true;
        }
        match part.split_once('-') {
            Some((lo, hi)) => match (lo.parse::<u16>(), hi.parse::<u16>()) {
                (Ok(lo), Ok(hi)) => (lo..=hi).contains(&port),
                _ => false,
            },
            None => part.parse::<u16>().is_ok_and(|p| p == port),
        }
    })
}

/// Evaluate access with last-matching-rule semantics and default deny.
pub fn evaluate_access(doc: &PolicyDocument, src: &str, dst: &str) -> AccessDecision {
    let (dst_target, port) = match dst.rsplit_once(':') {
        Some((target, port)) if port.parse::<u16>().is_ok() => (target, port.parse().ok()),
        _ => (dst, None),
    };

    let mut decision = RuleAction::Reject;
    let mut matched_rules = Vec::new();
    for (index, rule) in doc.rules.iter().enumerate() {
        let src_hit = rule.src.iter().any(|s| selector_matches(doc, s, src));
        let dst_hit = rule.dst.iter().any(|d| {
            split_destination(d).is_some_and(|(target, ports)| {
                selector_matches(doc, target, dst_target) && port_matches(ports, port)
            })
        });
        if src_hit && dst_hit {
            decision = rule.action.clone();
            matched_rules.push(MatchedRule {
                index,
                rule: rule.clone(),
            });
        }
    }

    AccessDecision {
        src: src.to_owned(),
        dst: dst_target.to_owned(),
        port,
        decision,
        matched_rules,
    }
}

// ── Operations ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PolicyOps {
    api: ApiClient,
    snapshot: Arc<Mutex<Option<NetworkPolicy>>>,
}

impl PolicyOps {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            snapshot: Arc::new(Mutex::new(None)),
        }
    }

    /// Same snapshot slot, different client.
    pub(crate) fn with_client(&self, api: ApiClient) -> Self {
        Self {
            api,
            snapshot: Arc::clone(&self.snapshot),
        }
    }

    pub async fn get(&self) -> Result<NetworkPolicy, CoreError> {
        let stored = self.api.get_acl().await?;
        Ok(NetworkPolicy {
            document: stored.policy.into(),
            revision: stored.etag,
            validation: ValidationState::Unvalidated,
        })
    }

    /// Local structural checks, then the server's dry run. Never changes
    /// the stored policy; an invalid document is an `Ok(Invalid)`.
    pub async fn validate(&self, doc: &PolicyDocument) -> Result<ValidationState, CoreError> {
        let local = check_document(doc);
        if !local.errors.is_empty() {
            return Ok(ValidationState::Invalid {
                reasons: local
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect(),
            });
        }

        let body = AclPolicyBody::from(doc.clone());
        let remote = self.api.validate_acl(&body).await?;
        let mut reasons: Vec<String> = remote.message.into_iter().collect();
        for detail in remote.data {
            reasons.extend(detail.errors.into_iter().map(|e| match &detail.user {
                Some(user) => format!("{user}: {e}"),
                None => e,
            }));
        }

        if reasons.is_empty() {
            Ok(ValidationState::Valid {
                warnings: local.warnings,
            })
        } else {
            Ok(ValidationState::Invalid { reasons })
        }
    }

    /// Replace the stored policy.
    ///
    /// When `expected_revision` is given the write is conditional on it;
    /// otherwise on the revision read for the snapshot. On success, or on
    /// a partial apply, the previous document is kept for [`rollback`].
    ///
    /// [`rollback`]: Self::rollback
    pub async fn update(
        &self,
        doc: &PolicyDocument,
        expected_revision: Option<&str>,
    ) -> Result<NetworkPolicy, CoreError> {
        let warnings = match self.validate(doc).await? {
            ValidationState::Valid { warnings } => warnings,
            ValidationState::Invalid { reasons } => {
                return Err(CoreError::invalid_fields(
                    "policy failed validation",
                    reasons
                        .into_iter()
                        .map(|r| FieldIssue::new("policy", r))
                        .collect(),
                ));
            }
            ValidationState::Unvalidated => Vec::new(),
        };

        let mut slot = self.snapshot.lock().await;

        let current = self.get().await?;
        if let (Some(expected), Some(actual)) = (expected_revision, current.revision.as_deref()) {
            if expected != actual {
                return Err(CoreError::validation(
                    "revision",
                    format!("expected revision {expected}, stored policy is at {actual}"),
                ));
            }
        }
        let if_match = expected_revision
            .map(str::to_owned)
            .or_else(|| current.revision.clone());

        let body = AclPolicyBody::from(doc.clone());
        match self.api.update_acl(&body, if_match.as_deref()).await {
            Ok(stored) => {
                info!(
                    previous = ?current.revision,
                    revision = ?stored.etag,
                    rules = stored.policy.acls.len(),
                    "policy updated"
                );
                *slot = Some(current);
                Ok(NetworkPolicy {
                    document: stored.policy.into(),
                    revision: stored.etag,
                    validation: ValidationState::Valid { warnings },
                })
            }
            Err(e @ tailctl_api::Error::PartialApply { .. }) => {
                warn!(previous = ?current.revision, "policy partially applied; snapshot retained");
                *slot = Some(current);
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Restore the document held from the last update. The snapshot is
    /// consumed on success and kept if the restore fails.
    pub async fn rollback(&self) -> Result<NetworkPolicy, CoreError> {
        let mut slot = self.snapshot.lock().await;
        let Some(previous) = slot.take() else {
            return Err(CoreError::not_found("policy snapshot", "no prior revision held"));
        };

        let body = AclPolicyBody::from(previous.document.clone());
        match self.api.update_acl(&body, None).await {
            Ok(stored) => {
                info!(restored = ?previous.revision, revision = ?stored.etag, "policy rolled back");
                Ok(NetworkPolicy {
                    document: stored.policy.into(),
                    revision: stored.etag,
                    validation: ValidationState::Unvalidated,
                })
            }
            Err(e) => {
                *slot = Some(previous);
                Err(e.into())
            }
        }
    }

    /// Whether a rollback snapshot is held.
    pub async fn has_snapshot(&self) -> bool {
        self.snapshot.lock().await.is_some()
    }

    /// Evaluate `src → dst` against `doc`, or the stored policy.
    pub async fn test_access(
        &self,
        doc: Option<&PolicyDocument>,
        src: &str,
        dst: &str,
    ) -> Result<AccessDecision, CoreError> {
        if src.trim().is_empty() {
            return Err(CoreError::validation("src", "must not be empty"));
        }
        if dst.trim().is_empty() {
            return Err(CoreError::validation("dst", "must not be empty"));
        }
        let decision = match doc {
            Some(doc) => evaluate_access(doc, src, dst),
            None => evaluate_access(&self.get().await?.document, src, dst),
        };
        info!(src, dst, decision = %decision.decision, "policy access tested");
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    fn doc(value: serde_json::Value) -> PolicyDocument {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn last_matching_rule_wins() {
        let policy = doc(json!({
            "groups": {"group:eng": ["alice@example.com"]},
            "acls": [
                {"action": "accept", "src": ["group:eng"], "dst": ["tag:db:5432"]},
                {"action": "reject", "src": ["*"], "dst": ["tag:db:*"]}
            ]
        }));
        let result = evaluate_access(&policy, "alice@example.com", "tag:db:5432");
        assert_eq!(result.decision, RuleAction::Reject);
        assert_eq!(result.matched_rules.len(), 2);
        assert_eq!(result.matched_rules[1].index, 1);
    }

    #[test]
    fn default_deny() {
        let policy = doc(json!({
            "acls": [{"action": "accept", "src": ["group:eng"], "dst": ["tag:web:443"]}]
        }));
        let result = evaluate_access(&policy, "bob@example.com", "tag:web:443");
        assert!(!result.allowed());
        assert!(result.matched_rules.is_empty());
    }

    #[test]
    fn ports_ranges_and_lists() {
        assert!(port_matches("22,80-90", Some(85)));
        assert!(!port_matches("22,80-90", Some(443)));
        assert!(port_matches("*", Some(1)));
        assert!(port_matches("22", None));
    }

    #[test]
    fn host_aliases_resolve() {
        let policy = doc(json!({
            "hosts": {"db": "100.64.0.9"},
            "acls": [{"action": "accept", "src": ["*"], "dst": ["db:5432"]}]
        }));
        assert!(evaluate_access(&policy, "anyone", "100.64.0.9:5432").allowed());
        assert!(!evaluate_access(&policy, "anyone", "100.64.0.9:22").allowed());
    }

    #[test]
    fn local_check_reports_structure() {
        let policy = doc(json!({
            "groups": {"eng": []},
            "acls": [{"src": [], "dst": ["nocolon"]}]
        }));
        let check = check_document(&policy);
        let fields: Vec<&str> = check.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["acls[0].action", "acls[0].src", "acls[0].dst[0]", "groups.eng"]
        );
    }
}
