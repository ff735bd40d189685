// ── DNS domain types ──

use serde::{Deserialize, Serialize};

/// Tailnet-wide DNS settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsConfig {
    pub nameservers: Vec<String>,
    pub magic_dns: bool,
    pub search_paths: Vec<String>,
}
