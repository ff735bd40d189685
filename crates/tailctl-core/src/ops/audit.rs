// ── Audit and compliance operations ──

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::info;

use crate::error::CoreError;
use crate::model::{AuditEvent, Device, DeviceStatus};
use crate::ops::devices::DeviceOps;

/// Devices unseen for longer than this are flagged stale.
pub const STALE_AFTER: TimeDelta = TimeDelta::days(30);

/// Upper bound for look-back windows, one year.
pub const MAX_WINDOW_HOURS: u32 = 8760;

const DEFAULT_EVENT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
const MAX_EVENT_WINDOW: Duration =
    Duration::from_secs(60 * 60).saturating_mul(MAX_WINDOW_HOURS);

// ── Configuration events ─────────────────────────────────────────────

/// Selects configuration audit events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    /// How far back to look; 24 hours when unset.
    pub window: Option<Duration>,
    /// Case-insensitive substring of the actor's login.
    pub actor: Option<String>,
    /// Case-insensitive substring of the action.
    pub action: Option<String>,
}

impl AuditFilter {
    fn matches(&self, event: &AuditEvent) -> bool {
        fn contains(haystack: Option<&str>, needle: Option<&str>) -> bool {
            match needle {
                Some(n) => haystack.is_some_and(|h| h.to_lowercase().contains(&n.to_lowercase())),
                None => true,
            }
        }
        contains(event.actor.as_deref(), self.actor.as_deref())
            && contains(Some(event.action.as_str()), self.action.as_deref())
    }
}

// ── Device compliance ────────────────────────────────────────────────

/// Narrows which devices a compliance audit covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuditFilter {
    pub os: Option<String>,
    /// Clients older than this are reported as outdated.
    pub min_version: Option<String>,
    #[serde(default)]
    pub require_authorized: bool,
    #[serde(default)]
    pub require_online: bool,
    #[serde(default)]
    pub tag_required: Vec<String>,
    #[serde(default)]
    pub tag_forbidden: Vec<String>,
}

impl DeviceAuditFilter {
    fn includes(&self, device: &Device) -> bool {
        if let Some(os) = &self.os {
            if !device.os.as_deref().is_some_and(|d| d.eq_ignore_ascii_case(os)) {
                return false;
            }
        }
        (!self.require_authorized || device.authorized)
            && (!self.require_online || device.is_online())
            && self.tag_required.iter().all(|t| device.has_tag(t))
            && !self.tag_forbidden.iter().any(|t| device.has_tag(t))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IssueKind {
    Unauthorized,
    ExpiredKey,
    OutdatedClient,
    NoTags,
    StaleDevice,
}

impl IssueKind {
    pub fn severity(self) -> Severity {
        match self {
            Self::Unauthorized | Self::ExpiredKey => Severity::High,
            Self::OutdatedClient | Self::StaleDevice => Severity::Medium,
            Self::NoTags => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub device_id: String,
    pub device_name: String,
    pub message: String,
}

impl AuditIssue {
    fn new(kind: IssueKind, device: &Device, message: String) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            message,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditStatistics {
    pub total_devices: usize,
    pub online: usize,
    pub offline: usize,
    pub unauthorized: usize,
    pub expired_keys: usize,
    pub outdated_clients: usize,
    pub no_tags: usize,
    pub stale: usize,
    pub by_os: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceAuditReport {
    pub statistics: AuditStatistics,
    pub issues: Vec<AuditIssue>,
    pub audited_at: DateTime<Utc>,
}

/// Compare dotted versions numerically, component by component. Trailing
/// build metadata (`1.62.0-t2a3b`) is ignored; missing components are 0.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    fn components(v: &str) -> Vec<u64> {
        v.trim()
            .trim_start_matches('v')
            .split(['-', '+', ' '])
            .next()
            .unwrap_or_default()
            .split('.')
            .map(|part| {
                let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    }
    let (a, b) = (components(a), components(b));
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            a.get(i)
                .copied()
                .unwrap_or(0)
                .cmp(&b.get(i).copied().unwrap_or(0))
        })
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

pub fn audit_devices(
    devices: &[Device],
    filter: &DeviceAuditFilter,
    now: DateTime<Utc>,
) -> DeviceAuditReport {
    let mut stats = AuditStatistics::default();
    let mut issues = Vec::new();

    for device in devices.iter().filter(|d| filter.includes(d)) {
        stats.total_devices += 1;
        match device.status {
            DeviceStatus::Online => stats.online += 1,
            DeviceStatus::Offline => stats.offline += 1,
            DeviceStatus::Unauthorized | DeviceStatus::Unknown => {}
        }
        let os = device.os.clone().unwrap_or_else(|| "unknown".into());
        *stats.by_os.entry(os).or_default() += 1;

        if !device.authorized {
            stats.unauthorized += 1;
            issues.push(AuditIssue::new(
                IssueKind::Unauthorized,
                device,
                format!("{} is not authorized", device.name),
            ));
        }
        if device.key_expired(now) {
            stats.expired_keys += 1;
            let at = device.key_expiry.map(|t| t.to_rfc3339()).unwrap_or_default();
            issues.push(AuditIssue::new(
                IssueKind::ExpiredKey,
                device,
                format!("{} has a node key that expired at {at}", device.name),
            ));
        }
        if let (Some(min), Some(current)) = (&filter.min_version, &device.client_version) {
            if compare_versions(current, min).is_lt() {
                stats.outdated_clients += 1;
                issues.push(AuditIssue::new(
                    IssueKind::OutdatedClient,
                    device,
                    format!("{} runs client {current}, below {min}", device.name),
                ));
            }
        }
        if device.tags.is_empty() {
            stats.no_tags += 1;
            issues.push(AuditIssue::new(
                IssueKind::NoTags,
                device,
                format!("{} has no tags", device.name),
            ));
        }
        if let Some(seen) = device.last_seen {
            if now - seen > STALE_AFTER {
                stats.stale += 1;
                issues.push(AuditIssue::new(
                    IssueKind::StaleDevice,
                    device,
                    format!("{} has not been seen in over 30 days", device.name),
                ));
            }
        }
    }

    DeviceAuditReport {
        statistics: stats,
        issues,
        audited_at: now,
    }
}

// ── Control-plane connectivity ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectivityEntry {
    pub device_id: String,
    pub device_name: String,
    pub connected_to_control: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub status: DeviceStatus,
    /// Set when the device has not checked in within the threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectivityReport {
    pub threshold_hours: u32,
    pub connected: Vec<ConnectivityEntry>,
    pub disconnected: Vec<ConnectivityEntry>,
    pub alerts: usize,
    pub checked_at: DateTime<Utc>,
}

pub fn connectivity(devices: &[Device], hours: u32, now: DateTime<Utc>) -> ConnectivityReport {
    let threshold = now
        .checked_sub_signed(TimeDelta::hours(i64::from(hours)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let mut report = ConnectivityReport {
        threshold_hours: hours,
        connected: Vec::new(),
        disconnected: Vec::new(),
        alerts: 0,
        checked_at: now,
    };
    for device in devices {
        let alert = device
            .last_seen
            .filter(|seen| *seen < threshold)
            .map(|_| format!("not seen in {hours}+ hours"));
        report.alerts += usize::from(alert.is_some());
        let entry = ConnectivityEntry {
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            connected_to_control: device.connected_to_control,
            last_seen: device.last_seen,
            status: device.status,
            alert,
        };
        if device.connected_to_control {
            report.connected.push(entry);
        } else {
            report.disconnected.push(entry);
        }
    }
    report
}

// ── Operations ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AuditOps {
    devices: DeviceOps,
}

impl AuditOps {
    pub fn new(devices: DeviceOps) -> Self {
        Self { devices }
    }

    /// Configuration audit events in the window, newest last as the server
    /// returns them.
    pub async fn events(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>, CoreError> {
        let window = filter.window.unwrap_or(DEFAULT_EVENT_WINDOW);
        if window.is_zero() || window > MAX_EVENT_WINDOW {
            return Err(CoreError::validation(
                "hours",
                format!("must be between 1 and {MAX_WINDOW_HOURS} hours"),
            ));
        }
        let end = Utc::now();
        let start = TimeDelta::from_std(window)
            .ok()
            .and_then(|span| end.checked_sub_signed(span))
            .ok_or_else(|| CoreError::validation("hours", "window reaches out of range"))?;

        let events: Vec<AuditEvent> = self
            .devices
            .api()
            .list_audit_logs(start, end)
            .await?
            .into_iter()
            .map(AuditEvent::from)
            .filter(|e| filter.matches(e))
            .collect();
        info!(count = events.len(), "audit events listed");
        Ok(events)
    }

    pub async fn audit_devices(
        &self,
        filter: &DeviceAuditFilter,
    ) -> Result<DeviceAuditReport, CoreError> {
        let devices = self.devices.all().await?;
        let report = audit_devices(&devices, filter, Utc::now());
        info!(
            devices = report.statistics.total_devices,
            issues = report.issues.len(),
            "device audit completed"
        );
        Ok(report)
    }

    pub async fn connectivity(&self, hours: u32) -> Result<ConnectivityReport, CoreError> {
        if hours == 0 || hours > MAX_WINDOW_HOURS {
            return Err(CoreError::validation(
                "hours",
                format!("must be between 1 and {MAX_WINDOW_HOURS}"),
            ));
        }
        let devices = self.devices.all().await?;
        Ok(connectivity(&devices, hours, Utc::now()))
    }
}
