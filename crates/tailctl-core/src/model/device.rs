// ── Device domain types ──

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, VariantNames};

use crate::liveness::LivenessPolicy;

/// Routes that make a device an exit node when enabled.
pub const EXIT_ROUTES: [&str; 2] = ["0.0.0.0/0", "::/0"];

pub fn is_exit_route(route: &str) -> bool {
    EXIT_ROUTES.contains(&route)
}

/// Derived device status.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Offline,
    Unauthorized,
    Unknown,
}

impl DeviceStatus {
    /// Unauthorized wins over liveness; a device never seen is unknown.
    pub fn classify(
        authorized: bool,
        connected: bool,
        last_seen: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        liveness: LivenessPolicy,
    ) -> Self {
        if !authorized {
            Self::Unauthorized
        } else if liveness.is_online(connected, last_seen, now) {
            Self::Online
        } else if last_seen.is_some() {
            Self::Offline
        } else {
            Self::Unknown
        }
    }
}

/// A node in the tailnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub node_id: Option<String>,
    /// Fully qualified MagicDNS name.
    pub name: String,
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub addresses: BTreeSet<IpAddr>,
    pub authorized: bool,
    pub tags: BTreeSet<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub connected_to_control: bool,
    pub status: DeviceStatus,
    pub is_exit_node: bool,
    pub is_subnet_router: bool,
    pub user: Option<String>,
    pub client_version: Option<String>,
    pub update_available: bool,
    pub key_expiry: Option<DateTime<Utc>>,
    pub key_expiry_disabled: bool,
    pub advertised_routes: Vec<String>,
    pub enabled_routes: Vec<String>,
}

impl Device {
    pub fn is_online(&self) -> bool {
        self.status == DeviceStatus::Online
    }

    /// First label of the MagicDNS name, or the hostname.
    pub fn short_name(&self) -> &str {
        match self.name.split('.').next() {
            Some(label) if !label.is_empty() => label,
            _ => self.hostname.as_deref().unwrap_or(&self.id),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Time since the device last checked in, if known.
    pub fn last_seen_age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_seen
            .map(|seen| (now - seen).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn key_expired(&self, now: DateTime<Utc>) -> bool {
        !self.key_expiry_disabled && self.key_expiry.is_some_and(|exp| exp <= now)
    }

    /// Enabled routes other than the exit routes.
    pub fn subnet_routes(&self) -> impl Iterator<Item = &str> {
        self.enabled_routes
            .iter()
            .map(String::as_str)
            .filter(|r| !is_exit_route(r))
    }
}
