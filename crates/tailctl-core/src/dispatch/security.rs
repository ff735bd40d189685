// ── `security` tool ──

use std::time::Duration;

use serde_json::{Value, json};
use strum::{Display, EnumIter, EnumString, VariantNames};

use super::{ParamSpec, Params, Paging, ToolOperation, encode};
use crate::error::CoreError;
use crate::ops::{AuditFilter, DeviceAuditFilter, Operations, TagMode};

/// Connectivity report window when `hours` is not given.
const DEFAULT_CONNECTIVITY_HOURS: u32 = 24;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, VariantNames,
)]
#[strum(serialize_all = "snake_case")]
pub enum SecurityOp {
    AuditLog,
    DeviceAudit,
    Connectivity,
    TagList,
    TagDevices,
    TagBatch,
    TagValidate,
    TagUsage,
}

impl ToolOperation for SecurityOp {
    fn params(self) -> ParamSpec {
        match self {
            Self::AuditLog => {
                ParamSpec::new(&[], &["hours", "actor", "action", "limit", "offset"])
            }
            Self::DeviceAudit => ParamSpec::new(
                &[],
                &[
                    "os",
                    "min_version",
                    "require_authorized",
                    "require_online",
                    "tag_required",
                    "tag_forbidden",
                ],
            ),
            Self::Connectivity => ParamSpec::new(&[], &["hours"]),
            Self::TagList | Self::TagUsage => ParamSpec::NONE,
            Self::TagDevices => ParamSpec::new(&["tag"], &["limit", "offset"]),
            Self::TagBatch => ParamSpec::new(&["device_ids", "tags"], &["mode"]),
            Self::TagValidate => ParamSpec::new(&["tag"], &[]),
        }
    }

    async fn run(self, ops: &Operations, p: &Params) -> Result<Value, CoreError> {
        match self {
            Self::AuditLog => {
                let paging = Paging::from_params(p)?;
                let filter = AuditFilter {
                    window: p
                        .opt_u32("hours")?
                        .map(|h| Duration::from_secs(u64::from(h) * 3600)),
                    actor: p.opt_str("actor")?.map(str::to_owned),
                    action: p.opt_str("action")?.map(str::to_owned),
                };
                paging.apply(ops.audit.events(&filter).await?)
            }
            Self::DeviceAudit => {
                let filter = DeviceAuditFilter {
                    os: p.opt_str("os")?.map(str::to_owned),
                    min_version: p.opt_str("min_version")?.map(str::to_owned),
                    require_authorized: p.flag("require_authorized")?,
                    require_online: p.flag("require_online")?,
                    tag_required: p.opt_string_list("tag_required")?.unwrap_or_default(),
                    tag_forbidden: p.opt_string_list("tag_forbidden")?.unwrap_or_default(),
                };
                encode(&ops.audit.audit_devices(&filter).await?)
            }
            Self::Connectivity => {
                let hours = p.opt_u32("hours")?.unwrap_or(DEFAULT_CONNECTIVITY_HOURS);
                encode(&ops.audit.connectivity(hours).await?)
            }
            Self::TagList => {
                let tags = ops.tags.list_all().await?;
                Ok(json!({"count": tags.len(), "tags": tags}))
            }
            Self::TagDevices => {
                let paging = Paging::from_params(p)?;
                paging.apply(ops.tags.devices_with_tag(p.str("tag")?).await?)
            }
            Self::TagBatch => {
                let mode: TagMode = p.opt_choice("mode")?.unwrap_or_default();
                encode(
                    &ops.tags
                        .batch_update(&p.string_list("device_ids")?, &p.string_list("tags")?, mode)
                        .await?,
                )
            }
            Self::TagValidate => encode(&ops.tags.validate_name(p.str("tag")?)),
            Self::TagUsage => encode(&ops.tags.usage().await?),
        }
    }
}
