// ── Device operations ──

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, VariantNames};
use tailctl_api::ApiClient;
use tracing::info;

use crate::convert::device_from_wire;
use crate::error::{CoreError, FieldIssue};
use crate::liveness::LivenessPolicy;
use crate::model::{Device, DeviceStatus, EXIT_ROUTES, is_exit_route, validate_tag_name};
use crate::ops::load_devices;

/// How `tag` combines the given tags with the device's current set.
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
pub enum TagMode {
    #[default]
    Add,
    Remove,
    Replace,
}

impl TagMode {
    pub fn apply(self, current: &BTreeSet<String>, tags: &[String]) -> BTreeSet<String> {
        match self {
            Self::Add => current.iter().chain(tags).cloned().collect(),
            Self::Remove => current
                .iter()
                .filter(|t| !tags.contains(t))
                .cloned()
                .collect(),
            Self::Replace => tags.iter().cloned().collect(),
        }
    }
}

/// Device fields free-text search looks at.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SearchField {
    Name,
    Hostname,
    Tags,
    Os,
}

impl SearchField {
    pub const DEFAULT: [Self; 3] = [Self::Name, Self::Hostname, Self::Tags];

    fn matches(self, device: &Device, needle: &str) -> bool {
        let contains = |s: &str| s.to_lowercase().contains(needle);
        match self {
            Self::Name => contains(&device.name),
            Self::Hostname => device.hostname.as_deref().is_some_and(contains),
            Self::Tags => device.tags.iter().any(|t| contains(t)),
            Self::Os => device.os.as_deref().is_some_and(contains),
        }
    }
}

/// Listing filters. All set criteria must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFilter {
    pub status: Option<DeviceStatus>,
    #[serde(default)]
    pub online_only: bool,
    /// Devices must carry at least one of these tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Case-insensitive substring over name, hostname and tags.
    pub search: Option<String>,
}

impl DeviceFilter {
    pub fn matches(&self, device: &Device) -> bool {
        if self.online_only && !device.is_online() {
            return false;
        }
        if self.status.is_some_and(|s| s != device.status) {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| device.has_tag(t)) {
            return false;
        }
        if let Some(query) = self.search.as_deref() {
            let needle = query.trim().to_lowercase();
            if !needle.is_empty()
                && !SearchField::DEFAULT
                    .iter()
                    .any(|f| f.matches(device, &needle))
            {
                return false;
            }
        }
        true
    }
}

/// Inventory counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceStats {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub unauthorized: usize,
    pub unknown: usize,
    pub exit_nodes: usize,
    pub subnet_routers: usize,
    pub update_available: usize,
    pub by_os: BTreeMap<String, usize>,
}

impl DeviceStats {
    pub fn from_devices(devices: &[Device]) -> Self {
        let mut stats = Self {
            total: devices.len(),
            ..Self::default()
        };
        for device in devices {
            match device.status {
                DeviceStatus::Online => stats.online += 1,
                DeviceStatus::Offline => stats.offline += 1,
                DeviceStatus::Unauthorized => stats.unauthorized += 1,
                DeviceStatus::Unknown => stats.unknown += 1,
            }
            stats.exit_nodes += usize::from(device.is_exit_node);
            stats.subnet_routers += usize::from(device.is_subnet_router);
            stats.update_available += usize::from(device.update_available);
            let os = device.os.clone().unwrap_or_else(|| "unknown".into());
            *stats.by_os.entry(os).or_default() += 1;
        }
        stats
    }
}

pub(crate) fn require_id(field: &str, id: &str) -> Result<(), CoreError> {
    if id.trim().is_empty() {
        return Err(CoreError::validation(field, "must not be empty"));
    }
    Ok(())
}

/// Every tag must pass naming rules; all failures are reported together.
pub(crate) fn check_tags(tags: &[String]) -> Result<(), CoreError> {
    let issues: Vec<FieldIssue> = tags
        .iter()
        .filter_map(|tag| {
            let check = validate_tag_name(tag);
            (!check.valid).then(|| FieldIssue::new("tags", format!("{tag}: {}", check.errors.join(", "))))
        })
        .collect();
    if issues.is_empty() {
        Ok(())
    } else {
        Err(CoreError::invalid_fields("invalid tags", issues))
    }
}

#[derive(Debug, Clone)]
pub struct DeviceOps {
    api: ApiClient,
    liveness: LivenessPolicy,
}

impl DeviceOps {
    pub fn new(api: ApiClient, liveness: LivenessPolicy) -> Self {
        Self { api, liveness }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn liveness(&self) -> LivenessPolicy {
        self.liveness
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Every device in server order.
    pub async fn all(&self) -> Result<Vec<Device>, CoreError> {
        load_devices(&self.api, self.liveness).await
    }

    /// Devices matching `filter`, in server order.
    pub async fn list(&self, filter: &DeviceFilter) -> Result<Vec<Device>, CoreError> {
        for tag in &filter.tags {
            if tag.trim().is_empty() {
                return Err(CoreError::validation("tags", "tag filter entries must not be empty"));
            }
        }
        let devices: Vec<Device> = self
            .all()
            .await?
            .into_iter()
            .filter(|d| filter.matches(d))
            .collect();
        info!(count = devices.len(), ?filter, "devices listed");
        Ok(devices)
    }

    pub async fn get(&self, device_id: &str) -> Result<Device, CoreError> {
        require_id("device_id", device_id)?;
        let raw = self.api.get_device(device_id).await.map_err(|e| {
            if e.is_not_found() {
                CoreError::not_found("device", device_id)
            } else {
                e.into()
            }
        })?;
        Ok(device_from_wire(raw, Utc::now(), self.liveness))
    }

    /// Free-text search over the chosen fields (default name, hostname
    /// and tags). A device matches if any field contains the query.
    pub async fn search(
        &self,
        query: &str,
        fields: &[SearchField],
    ) -> Result<Vec<Device>, CoreError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(CoreError::validation("query", "must not be empty"));
        }
        let fields = if fields.is_empty() {
            &SearchField::DEFAULT[..]
        } else {
            fields
        };
        let matches: Vec<Device> = self
            .all()
            .await?
            .into_iter()
            .filter(|d| fields.iter().any(|f| f.matches(d, &needle)))
            .collect();
        info!(query, matches = matches.len(), "devices searched");
        Ok(matches)
    }

    pub async fn stats(&self) -> Result<DeviceStats, CoreError> {
        Ok(DeviceStats::from_devices(&self.all().await?))
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Approve or de-authorize a device, returning its new state.
    pub async fn authorize(
        &self,
        device_id: &str,
        authorized: bool,
        reason: Option<&str>,
    ) -> Result<Device, CoreError> {
        require_id("device_id", device_id)?;
        self.api.set_device_authorized(device_id, authorized).await?;
        info!(device_id, authorized, reason, "device authorization changed");
        self.get(device_id).await
    }

    pub async fn rename(&self, device_id: &str, name: &str) -> Result<Device, CoreError> {
        require_id("device_id", device_id)?;
        let name = name.trim();
        if name.is_empty() || name.len() > 63 || name.contains(char::is_whitespace) {
            return Err(CoreError::validation(
                "name",
                "must be 1-63 characters without whitespace",
            ));
        }
        self.api.set_device_name(device_id, name).await?;
        info!(device_id, name, "device renamed");
        self.get(device_id).await
    }

    /// Add, remove or replace tags on one device.
    pub async fn tag(
        &self,
        device_id: &str,
        tags: &[String],
        mode: TagMode,
    ) -> Result<Device, CoreError> {
        require_id("device_id", device_id)?;
        check_tags(tags)?;
        self.apply_tags(device_id, tags, mode).await
    }

    /// Tag update with the tag list already validated.
    pub(crate) async fn apply_tags(
        &self,
        device_id: &str,
        tags: &[String],
        mode: TagMode,
    ) -> Result<Device, CoreError> {
        let current = self.get(device_id).await?;
        let next: Vec<String> = mode.apply(&current.tags, tags).into_iter().collect();
        self.api.set_device_tags(device_id, &next).await?;
        info!(device_id, %mode, tags = ?next, "device tags updated");
        self.get(device_id).await
    }

    pub async fn delete(&self, device_id: &str) -> Result<(), CoreError> {
        require_id("device_id", device_id)?;
        self.api.delete_device(device_id).await.map_err(|e| {
            if e.is_not_found() {
                CoreError::not_found("device", device_id)
            } else {
                e.into()
            }
        })?;
        info!(device_id, "device deleted");
        Ok(())
    }

    /// Enable or disable a device as exit node. The device must already
    /// advertise the exit routes.
    pub async fn set_exit_node(&self, device_id: &str, enable: bool) -> Result<Device, CoreError> {
        require_id("device_id", device_id)?;
        let routes = self.api.get_device_routes(device_id).await?;

        if enable
            && !EXIT_ROUTES
                .iter()
                .all(|r| routes.advertised_routes.iter().any(|a| a == r))
        {
            return Err(CoreError::validation(
                "device_id",
                "device does not advertise exit routes",
            ));
        }

        let mut enabled: Vec<String> = routes
            .enabled_routes
            .into_iter()
            .filter(|r| !is_exit_route(r))
            .collect();
        if enable {
            enabled.extend(EXIT_ROUTES.iter().map(|r| (*r).to_owned()));
        }
        self.api.set_device_routes(device_id, &enabled).await?;
        info!(device_id, enable, "exit node updated");
        self.get(device_id).await
    }

    /// Replace the enabled subnet routes, keeping any exit routes.
    pub async fn set_subnet_routes(
        &self,
        device_id: &str,
        routes: &[String],
    ) -> Result<Device, CoreError> {
        require_id("device_id", device_id)?;
        let parsed = parse_subnet_routes(routes)?;

        let current = self.api.get_device_routes(device_id).await?;
        let mut enabled: Vec<String> = current
            .enabled_routes
            .into_iter()
            .filter(|r| is_exit_route(r))
            .collect();
        enabled.extend(parsed.iter().map(ToString::to_string));

        self.api.set_device_routes(device_id, &enabled).await?;
        info!(device_id, routes = ?enabled, "subnet routes updated");
        self.get(device_id).await
    }
}

/// Parse CIDR routes, rejecting exit routes and host bits.
fn parse_subnet_routes(routes: &[String]) -> Result<Vec<IpNet>, CoreError> {
    let mut parsed = Vec::with_capacity(routes.len());
    let mut issues = Vec::new();
    for (i, route) in routes.iter().enumerate() {
        let field = format!("routes[{i}]");
        match route.trim().parse::<IpNet>() {
            Ok(net) if is_exit_route(&net.to_string()) => {
                issues.push(FieldIssue::new(field, "exit routes are set with exit_node"));
            }
            Ok(net) if net.trunc() != net => {
                issues.push(FieldIssue::new(
                    field,
                    format!("{route} has host bits set; did you mean {}?", net.trunc()),
                ));
            }
            Ok(net) => {
                if !parsed.contains(&net) {
                    parsed.push(net);
                }
            }
            Err(_) => issues.push(FieldIssue::new(field, format!("{route} is not a CIDR prefix"))),
        }
    }
    if issues.is_empty() {
        Ok(parsed)
    } else {
        Err(CoreError::invalid_fields("invalid subnet routes", issues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|t| (*t).to_owned()).collect()
    }

    fn owned(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| (*t).to_owned()).collect()
    }

    #[test]
    fn tag_modes() {
        let current = set(&["tag:a", "tag:b"]);
        assert_eq!(
            TagMode::Add.apply(&current, &owned(&["tag:c"])),
            set(&["tag:a", "tag:b", "tag:c"])
        );
        assert_eq!(
            TagMode::Remove.apply(&current, &owned(&["tag:a"])),
            set(&["tag:b"])
        );
        assert_eq!(
            TagMode::Replace.apply(&current, &owned(&["tag:z"])),
            set(&["tag:z"])
        );
    }

    #[test]
    fn subnet_routes_are_validated_together() {
        let err = parse_subnet_routes(&owned(&["10.0.0.0/24", "nope", "10.0.0.1/24", "::/0"]))
            .err();
        let fields: Vec<String> = err
            .map(|e| e.fields().iter().map(|f| f.field.clone()).collect())
            .unwrap_or_default();
        assert_eq!(fields, vec!["routes[1]", "routes[2]", "routes[3]"]);
    }

    #[test]
    fn subnet_routes_dedupe() {
        let parsed = parse_subnet_routes(&owned(&["192.168.1.0/24", "192.168.1.0/24"]))
            .unwrap_or_default();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn invalid_tags_are_all_reported() {
        let err = check_tags(&owned(&["tag:ok", "bad", "tag:no spaces"])).err();
        assert_eq!(err.map(|e| e.fields().len()), Some(2));
    }
}
