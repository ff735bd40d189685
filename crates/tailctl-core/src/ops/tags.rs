// ── Tag operations ──

use std::collections::BTreeMap;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{CoreError, ErrorKind, FieldIssue};
use crate::model::{Device, TagValidation, validate_tag_name};
use crate::ops::devices::{DeviceOps, TagMode, check_tags, require_id};

/// Result for one device in a batch.
#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub device_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

/// Why one device in a batch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldIssue>,
}

impl From<&CoreError> for ItemError {
    fn from(err: &CoreError) -> Self {
        Self {
            kind: err.kind(),
            code: err.code(),
            message: err.to_string(),
            fields: err.fields().to_vec(),
        }
    }
}

/// Per-item results, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<ItemOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagUsageEntry {
    pub tag: String,
    pub device_count: usize,
    pub device_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagUsage {
    pub total_unique_tags: usize,
    pub untagged_devices: usize,
    /// Most used first; ties by tag name.
    pub tags: Vec<TagUsageEntry>,
}

fn tag_usage(devices: &[Device]) -> TagUsage {
    let mut by_tag: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for device in devices {
        for tag in &device.tags {
            by_tag.entry(tag).or_default().push(device.id.clone());
        }
    }
    let mut tags: Vec<TagUsageEntry> = by_tag
        .into_iter()
        .map(|(tag, device_ids)| TagUsageEntry {
            tag: tag.to_owned(),
            device_count: device_ids.len(),
            device_ids,
        })
        .collect();
    tags.sort_by(|a, b| b.device_count.cmp(&a.device_count).then_with(|| a.tag.cmp(&b.tag)));

    TagUsage {
        total_unique_tags: tags.len(),
        untagged_devices: devices.iter().filter(|d| d.tags.is_empty()).count(),
        tags,
    }
}

#[derive(Debug, Clone)]
pub struct TagOps {
    devices: DeviceOps,
}

impl TagOps {
    pub fn new(devices: DeviceOps) -> Self {
        Self { devices }
    }

    /// Distinct tags across all devices, sorted.
    pub async fn list_all(&self) -> Result<Vec<String>, CoreError> {
        let devices = self.devices.all().await?;
        let mut tags: Vec<String> = devices.into_iter().flat_map(|d| d.tags).collect();
        tags.sort();
        tags.dedup();
        Ok(tags)
    }

    pub async fn devices_with_tag(&self, tag: &str) -> Result<Vec<Device>, CoreError> {
        require_id("tag", tag)?;
        Ok(self
            .devices
            .all()
            .await?
            .into_iter()
            .filter(|d| d.has_tag(tag))
            .collect())
    }

    /// Apply one tag change to many devices concurrently.
    ///
    /// Tags are validated once up front; a bad tag fails the whole batch
    /// before any request. Per-device failures are reported in the outcome
    /// and do not stop the other devices.
    pub async fn batch_update(
        &self,
        device_ids: &[String],
        tags: &[String],
        mode: TagMode,
    ) -> Result<BatchOutcome, CoreError> {
        if device_ids.is_empty() {
            return Err(CoreError::validation("device_ids", "must not be empty"));
        }
        check_tags(tags)?;

        let results: Vec<ItemOutcome> = join_all(device_ids.iter().map(|id| async move {
            let result = if id.trim().is_empty() {
                Err(CoreError::validation("device_id", "must not be empty"))
            } else {
                self.devices.apply_tags(id, tags, mode).await
            };
            match result {
                Ok(device) => ItemOutcome {
                    device_id: id.clone(),
                    ok: true,
                    tags: Some(device.tags.into_iter().collect()),
                    error: None,
                },
                Err(e) => {
                    warn!(device_id = %id, error = %e, "batch tag update failed for device");
                    ItemOutcome {
                        device_id: id.clone(),
                        ok: false,
                        tags: None,
                        error: Some(ItemError::from(&e)),
                    }
                }
            }
        }))
        .await;

        let succeeded = results.iter().filter(|r| r.ok).count();
        let outcome = BatchOutcome {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        };
        info!(
            total = outcome.total,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            %mode,
            "batch tag update completed"
        );
        Ok(outcome)
    }

    pub fn validate_name(&self, tag: &str) -> TagValidation {
        validate_tag_name(tag)
    }

    pub async fn usage(&self) -> Result<TagUsage, CoreError> {
        Ok(tag_usage(&self.devices.all().await?))
    }
}
