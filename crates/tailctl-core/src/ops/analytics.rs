// ── Usage analytics ──
//
// Derived entirely from the device inventory; the control plane exposes
// no traffic history through this API.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::CoreError;
use crate::model::Device;
use crate::ops::devices::{DeviceOps, DeviceStats};

pub const MAX_USAGE_DAYS: u32 = 365;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageAnalytics {
    pub period_days: u32,
    pub total_devices: usize,
    pub active_devices: usize,
    pub inactive_devices: usize,
    pub online_devices: usize,
    pub authorized_devices: usize,
    /// Share of devices seen within the period, 0.0 for an empty tailnet.
    pub activity_rate: f64,
    pub active_device_ids: Vec<String>,
    pub inactive_device_ids: Vec<String>,
}

pub fn usage(devices: &[Device], days: u32, now: DateTime<Utc>) -> UsageAnalytics {
    let cutoff = now - TimeDelta::days(i64::from(days));
    let (active, inactive): (Vec<&Device>, Vec<&Device>) = devices
        .iter()
        .partition(|d| d.last_seen.is_some_and(|seen| seen >= cutoff));

    #[allow(clippy::cast_precision_loss)]
    let activity_rate = if devices.is_empty() {
        0.0
    } else {
        active.len() as f64 / devices.len() as f64
    };

    UsageAnalytics {
        period_days: days,
        total_devices: devices.len(),
        active_devices: active.len(),
        inactive_devices: inactive.len(),
        online_devices: devices.iter().filter(|d| d.is_online()).count(),
        authorized_devices: devices.iter().filter(|d| d.authorized).count(),
        activity_rate,
        active_device_ids: active.iter().map(|d| d.id.clone()).collect(),
        inactive_device_ids: inactive.iter().map(|d| d.id.clone()).collect(),
    }
}

/// Devices bucketed by how recently they checked in. Each device lands in
/// exactly one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivityTrends {
    pub last_hour: usize,
    pub last_24_hours: usize,
    pub last_7_days: usize,
    pub last_30_days: usize,
    pub older: usize,
    /// Never seen, or no `last_seen` reported.
    pub unknown: usize,
}

pub fn activity_trends(devices: &[Device], now: DateTime<Utc>) -> ActivityTrends {
    let mut trends = ActivityTrends::default();
    for device in devices {
        let Some(seen) = device.last_seen else {
            trends.unknown += 1;
            continue;
        };
        let age = now - seen;
        if age < TimeDelta::hours(1) {
            trends.last_hour += 1;
        } else if age < TimeDelta::hours(24) {
            trends.last_24_hours += 1;
        } else if age < TimeDelta::days(7) {
            trends.last_7_days += 1;
        } else if age < TimeDelta::days(30) {
            trends.last_30_days += 1;
        } else {
            trends.older += 1;
        }
    }
    trends
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkStatistics {
    #[serde(flatten)]
    pub devices: DeviceStats,
    pub tagged_devices: usize,
    pub untagged_devices: usize,
    pub distinct_tags: usize,
    pub total_addresses: usize,
}

pub fn network_statistics(devices: &[Device]) -> NetworkStatistics {
    let mut tags: Vec<&String> = devices.iter().flat_map(|d| &d.tags).collect();
    tags.sort();
    tags.dedup();
    let tagged = devices.iter().filter(|d| !d.tags.is_empty()).count();
    NetworkStatistics {
        devices: DeviceStats::from_devices(devices),
        tagged_devices: tagged,
        untagged_devices: devices.len() - tagged,
        distinct_tags: tags.len(),
        total_addresses: devices.iter().map(|d| d.addresses.len()).sum(),
    }
}

#[derive(Debug, Clone)]
pub struct AnalyticsOps {
    devices: DeviceOps,
}

impl AnalyticsOps {
    pub fn new(devices: DeviceOps) -> Self {
        Self { devices }
    }

    pub async fn usage(&self, days: u32) -> Result<UsageAnalytics, CoreError> {
        if days == 0 || days > MAX_USAGE_DAYS {
            return Err(CoreError::validation(
                "days",
                format!("must be between 1 and {MAX_USAGE_DAYS}"),
            ));
        }
        let report = usage(&self.devices.all().await?, days, Utc::now());
        info!(days, active = report.active_devices, "usage analytics computed");
        Ok(report)
    }

    pub async fn activity_trends(&self) -> Result<ActivityTrends, CoreError> {
        Ok(activity_trends(&self.devices.all().await?, Utc::now()))
    }

    pub async fn network_statistics(&self) -> Result<NetworkStatistics, CoreError> {
        Ok(network_statistics(&self.devices.all().await?))
    }
}
