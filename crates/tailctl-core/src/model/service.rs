// ── Service domain types ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, VariantNames};

use crate::error::{CoreError, FieldIssue};
use crate::model::tag::validate_tag_name;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

/// Backend of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
}

/// A named virtual address fronting one or more endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    /// Stable virtual addresses assigned by the control plane.
    pub addresses: Vec<String>,
    pub endpoints: Vec<ServiceEndpoint>,
    pub tags: Vec<String>,
}

/// Caller-supplied definition for create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub endpoints: Vec<ServiceEndpoint>,
}

impl ServiceSpec {
    /// Local checks: DNS-label name, at least one endpoint, non-zero ports,
    /// non-empty hosts and well-formed tags. Every problem is reported.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut issues = Vec::new();

        if !is_dns_label(&self.name) {
            issues.push(FieldIssue::new(
                "name",
                "must be 1-63 characters of lowercase letters, digits or '-', not starting or ending with '-'",
            ));
        }
        if self.endpoints.is_empty() {
            issues.push(FieldIssue::new("endpoints", "at least one endpoint is required"));
        }
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            if endpoint.host.trim().is_empty() {
                issues.push(FieldIssue::new(format!("endpoints[{i}].host"), "must not be empty"));
            }
            if endpoint.port == 0 {
                issues.push(FieldIssue::new(
                    format!("endpoints[{i}].port"),
                    "must be between 1 and 65535",
                ));
            }
        }
        for tag in &self.tags {
            let check = validate_tag_name(tag);
            if !check.valid {
                issues.push(FieldIssue::new("tags", format!("{tag}: {}", check.errors.join(", "))));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(CoreError::invalid_fields("invalid service definition", issues))
        }
    }
}

fn is_dns_label(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, port: u16) -> ServiceSpec {
        ServiceSpec {
            name: name.into(),
            tags: vec!["tag:web".into()],
            endpoints: vec![ServiceEndpoint {
                host: "100.64.0.5".into(),
                port,
                protocol: Protocol::Tcp,
            }],
        }
    }

    #[test]
    fn valid_spec_passes() {
        assert!(spec("web-frontend", 443).validate().is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let mut bad = spec("Web_Frontend", 0);
        bad.tags.push("web".into());
        let err = bad.validate().err();
        let fields: Vec<_> = err
            .as_ref()
            .map(|e| e.fields().iter().map(|f| f.field.as_str()).collect())
            .unwrap_or_default();
        assert_eq!(fields, vec!["name", "endpoints[0].port", "tags"]);
    }

    #[test]
    fn protocol_parses_case_insensitively() {
        assert_eq!("UDP".parse::<Protocol>().ok(), Some(Protocol::Udp));
        assert!("icmp".parse::<Protocol>().is_err());
    }
}
