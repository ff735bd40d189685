// ── Network (DNS) operations ──

use std::net::IpAddr;

use tailctl_api::ApiClient;
use tailctl_api::types::DnsPreferencesBody;
use tracing::info;

use crate::error::{CoreError, FieldIssue};
use crate::model::DnsConfig;

#[derive(Debug, Clone)]
pub struct NetworkOps {
    api: ApiClient,
}

impl NetworkOps {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Nameservers, MagicDNS preference and search paths, read concurrently.
    pub async fn dns_config(&self) -> Result<DnsConfig, CoreError> {
        let (nameservers, preferences, search_paths) = tokio::try_join!(
            self.api.get_nameservers(),
            self.api.get_dns_preferences(),
            self.api.get_search_paths(),
        )?;
        Ok(DnsConfig {
            nameservers,
            magic_dns: preferences.magic_dns,
            search_paths,
        })
    }

    /// Replace the global nameserver list. Every entry must be an IP address.
    pub async fn set_nameservers(&self, nameservers: &[String]) -> Result<Vec<String>, CoreError> {
        let issues: Vec<FieldIssue> = nameservers
            .iter()
            .enumerate()
            .filter(|(_, ns)| ns.trim().parse::<IpAddr>().is_err())
            .map(|(i, ns)| {
                FieldIssue::new(format!("nameservers[{i}]"), format!("{ns} is not an IP address"))
            })
            .collect();
        if !issues.is_empty() {
            return Err(CoreError::invalid_fields("invalid nameservers", issues));
        }

        let normalized: Vec<String> = nameservers.iter().map(|ns| ns.trim().to_owned()).collect();
        let stored = self.api.set_nameservers(&normalized).await?;
        info!(count = stored.len(), "nameservers updated");
        Ok(stored)
    }

    pub async fn set_magic_dns(&self, enabled: bool) -> Result<bool, CoreError> {
        let stored = self
            .api
            .set_dns_preferences(DnsPreferencesBody { magic_dns: enabled })
            .await?;
        info!(magic_dns = stored.magic_dns, "MagicDNS preference updated");
        Ok(stored.magic_dns)
    }

    /// Replace the search domains. Entries must be valid domain names.
    pub async fn set_search_paths(&self, paths: &[String]) -> Result<Vec<String>, CoreError> {
        let issues: Vec<FieldIssue> = paths
            .iter()
            .enumerate()
            .filter(|(_, p)| !is_domain_name(p.trim()))
            .map(|(i, p)| {
                FieldIssue::new(format!("search_paths[{i}]"), format!("{p} is not a domain name"))
            })
            .collect();
        if !issues.is_empty() {
            return Err(CoreError::invalid_fields("invalid search paths", issues));
        }

        let normalized: Vec<String> = paths
            .iter()
            .map(|p| p.trim().trim_end_matches('.').to_ascii_lowercase())
            .collect();
        let stored = self.api.set_search_paths(&normalized).await?;
        info!(count = stored.len(), "search paths updated");
        Ok(stored)
    }
}

/// Dot-separated labels of letters, digits and inner hyphens; 253 chars max.
fn is_domain_name(name: &str) -> bool {
    let name = name.strip_suffix('.').unwrap_or(name);
    !name.is_empty()
        && name.len() <= 253
        && name.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}
