// ── Reports and exports ──
//
// The device inventory is required; every other section degrades to
// `unavailable` with the reason when its source fails.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, VariantNames};
use tracing::{info, warn};

use crate::error::CoreError;
use crate::model::{Device, DnsConfig};
use crate::ops::analytics::{NetworkStatistics, network_statistics};
use crate::ops::devices::{DeviceFilter, DeviceOps};
use crate::ops::network::NetworkOps;
use crate::ops::policies::PolicyOps;
use crate::ops::policy_analysis::{PolicyAnalysis, analyze_document};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ReportFormat {
    #[default]
    Json,
    Html,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

/// A report section that may be missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Section<T> {
    Available { data: T },
    Unavailable { reason: String },
}

impl<T> Section<T> {
    fn from_result(name: &str, result: Result<T, CoreError>) -> Self {
        match result {
            Ok(data) => Self::Available { data },
            Err(e) => {
                warn!(section = name, error = %e, "report section unavailable");
                Self::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRow {
    pub id: String,
    pub name: String,
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub status: String,
    pub authorized: bool,
    pub tags: Vec<String>,
    pub addresses: Vec<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl From<&Device> for DeviceRow {
    fn from(d: &Device) -> Self {
        Self {
            id: d.id.clone(),
            name: d.name.clone(),
            hostname: d.hostname.clone(),
            os: d.os.clone(),
            status: d.status.to_string(),
            authorized: d.authorized,
            tags: d.tags.iter().cloned().collect(),
            addresses: d.addresses.iter().map(ToString::to_string).collect(),
            last_seen: d.last_seen,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkReport {
    pub generated_at: DateTime<Utc>,
    pub statistics: NetworkStatistics,
    pub devices: Vec<DeviceRow>,
    pub policy: Section<PolicyAnalysis>,
    pub dns: Section<DnsConfig>,
}

/// A report rendered in the requested format.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "format", content = "content", rename_all = "lowercase")]
pub enum ReportOutput {
    Json(Box<NetworkReport>),
    Html(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceExport {
    pub format: ExportFormat,
    pub device_count: usize,
    pub content: String,
}

// ── Rendering ────────────────────────────────────────────────────────

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render_html(report: &NetworkReport) -> String {
    let stats = &report.statistics.devices;
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Tailnet report</title>\n\
         <style>body{font-family:sans-serif;margin:20px}table{border-collapse:collapse;width:100%}\
         th,td{border:1px solid #ddd;padding:6px;text-align:left}</style>\n</head>\n<body>\n",
    );
    let _ = write!(
        html,
        "<h1>Tailnet report</h1>\n<p>Generated {}</p>\n<h2>Summary</h2>\n<ul>\n\
         <li>Devices: {}</li>\n<li>Online: {}</li>\n<li>Offline: {}</li>\n\
         <li>Unauthorized: {}</li>\n<li>Untagged: {}</li>\n",
        report.generated_at.to_rfc3339(),
        stats.total,
        stats.online,
        stats.offline,
        stats.unauthorized,
        report.statistics.untagged_devices,
    );
    match &report.policy {
        Section::Available { data } => {
            let _ = writeln!(html, "<li>Policy rules: {}</li>", data.rules);
        }
        Section::Unavailable { reason } => {
            let _ = writeln!(html, "<li>Policy: unavailable ({})</li>", escape_html(reason));
        }
    }
    match &report.dns {
        Section::Available { data } => {
            let _ = writeln!(html, "<li>MagicDNS: {}</li>", if data.magic_dns { "on" } else { "off" });
        }
        Section::Unavailable { reason } => {
            let _ = writeln!(html, "<li>DNS: unavailable ({})</li>", escape_html(reason));
        }
    }
    html.push_str(
        "</ul>\n<h2>Devices</h2>\n<table>\n<tr><th>Name</th><th>Status</th><th>OS</th>\
         <th>Authorized</th><th>Tags</th><th>Last seen</th></tr>\n",
    );
    for d in &report.devices {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&d.name),
            d.status,
            escape_html(d.os.as_deref().unwrap_or("-")),
            if d.authorized { "yes" } else { "no" },
            escape_html(&d.tags.join(", ")),
            d.last_seen.map_or_else(|| "-".to_owned(), |t| t.to_rfc3339()),
        );
    }
    html.push_str("</table>\n</body>\n</html>\n");
    html
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_owned()
    }
}

pub fn render_csv(rows: &[DeviceRow]) -> String {
    let mut out =
        String::from("id,name,hostname,os,status,authorized,tags,addresses,last_seen\n");
    for row in rows {
        let fields = [
            row.id.clone(),
            row.name.clone(),
            row.hostname.clone().unwrap_or_default(),
            row.os.clone().unwrap_or_default(),
            row.status.clone(),
            row.authorized.to_string(),
            row.tags.join(";"),
            row.addresses.join(";"),
            row.last_seen.map(|t| t.to_rfc3339()).unwrap_or_default(),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

// ── Operations ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReportingOps {
    devices: DeviceOps,
    policies: PolicyOps,
    network: NetworkOps,
}

impl ReportingOps {
    pub fn new(devices: DeviceOps, policies: PolicyOps) -> Self {
        let network = NetworkOps::new(devices.api().clone());
        Self {
            devices,
            policies,
            network,
        }
    }

    /// Snapshot of the tailnet: inventory, statistics, policy summary and
    /// DNS settings.
    pub async fn network_report(&self, format: ReportFormat) -> Result<ReportOutput, CoreError> {
        let (devices, policy, dns) = tokio::join!(
            self.devices.all(),
            self.policies.get(),
            self.network.dns_config(),
        );
        let devices = devices?;

        let report = NetworkReport {
            generated_at: Utc::now(),
            statistics: network_statistics(&devices),
            devices: devices.iter().map(DeviceRow::from).collect(),
            policy: Section::from_result(
                "policy",
                policy.map(|p| {
                    let mut analysis = analyze_document(&p.document);
                    analysis.revision = p.revision;
                    analysis
                }),
            ),
            dns: Section::from_result("dns", dns),
        };
        info!(
            %format,
            devices = report.devices.len(),
            policy = report.policy.is_available(),
            dns = report.dns.is_available(),
            "network report generated"
        );

        Ok(match format {
            ReportFormat::Json => ReportOutput::Json(Box::new(report)),
            ReportFormat::Html => ReportOutput::Html(render_html(&report)),
        })
    }

    /// Devices matching `filter`, serialized as JSON or CSV.
    pub async fn export_devices(
        &self,
        format: ExportFormat,
        filter: &DeviceFilter,
    ) -> Result<DeviceExport, CoreError> {
        let rows: Vec<DeviceRow> = self
            .devices
            .list(filter)
            .await?
            .iter()
            .map(DeviceRow::from)
            .collect();
        let content = match format {
            ExportFormat::Json => serde_json::to_string_pretty(&rows)
                .map_err(|e| CoreError::validation("format", e.to_string()))?,
            ExportFormat::Csv => render_csv(&rows),
        };
        Ok(DeviceExport {
            format,
            device_count: rows.len(),
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, tags: &[&str]) -> DeviceRow {
        DeviceRow {
            id: "n1".into(),
            name: name.into(),
            hostname: None,
            os: Some("linux".into()),
            status: "online".into(),
            authorized: true,
            tags: tags.iter().map(|t| (*t).to_owned()).collect(),
            addresses: vec!["100.64.0.1".into()],
            last_seen: None,
        }
    }

    #[test]
    fn csv_quotes_only_when_needed() {
        let csv = render_csv(&[row("web, \"prod\"", &["tag:a", "tag:b"])]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            "n1,\"web, \"\"prod\"\"\",,linux,online,true,tag:a;tag:b,100.64.0.1,"
        );
    }

    #[test]
    fn html_escapes_device_fields() {
        let report = NetworkReport {
            generated_at: Utc::now(),
            statistics: network_statistics(&[]),
            devices: vec![row("<script>", &[])],
            policy: Section::Unavailable {
                reason: "403 <forbidden>".into(),
            },
            dns: Section::Available {
                data: DnsConfig::default(),
            },
        };
        let html = render_html(&report);
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("Policy: unavailable (403 &lt;forbidden&gt;)"));
    }

    #[test]
    fn unavailable_section_serializes_with_reason() {
        let section: Section<u32> = Section::Unavailable {
            reason: "down".into(),
        };
        assert_eq!(
            serde_json::to_value(&section).ok(),
            Some(serde_json::json!({"status": "unavailable", "reason": "down"}))
        );
    }
}
