// ── Network policy domain types ──

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// What a rule does with matching traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleAction {
    Accept,
    Reject,
    /// Anything else, kept verbatim so it can be reported and written back.
    Other(String),
}

impl RuleAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Other(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "accept" => Self::Accept,
            "reject" => Self::Reject,
            _ => Self::Other(raw.to_owned()),
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RuleAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RuleAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

impl Default for RuleAction {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

/// One ACL rule. `dst` entries are `target:ports`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRule {
    #[serde(default, alias = "Action")]
    pub action: RuleAction,
    #[serde(default, alias = "Src")]
    pub src: Vec<String>,
    #[serde(default, alias = "Dst")]
    pub dst: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<String>,
}

/// ACL document in the control plane's JSON shape.
///
/// Sections without a typed field are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDocument {
    #[serde(default, rename = "acls", alias = "ACLs")]
    pub rules: Vec<AclRule>,
    #[serde(default, alias = "Hosts", skip_serializing_if = "IndexMap::is_empty")]
    pub hosts: IndexMap<String, String>,
    #[serde(default, alias = "Groups", skip_serializing_if = "IndexMap::is_empty")]
    pub groups: IndexMap<String, Vec<String>>,
    #[serde(default, alias = "TagOwners", skip_serializing_if = "IndexMap::is_empty")]
    pub tag_owners: IndexMap<String, Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of validating a policy document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ValidationState {
    #[default]
    Unvalidated,
    Valid { warnings: Vec<String> },
    Invalid { reasons: Vec<String> },
}

impl ValidationState {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

/// A policy document as stored, with its revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkPolicy {
    pub document: PolicyDocument,
    /// Opaque revision tag (the document's `ETag`).
    pub revision: Option<String>,
    pub validation: ValidationState,
}
