// ── `reporting` tool ──

use serde_json::Value;
use strum::{Display, EnumIter, EnumString, VariantNames};

use super::{ParamSpec, Params, ToolOperation, encode};
use crate::error::CoreError;
use crate::ops::{DeviceFilter, ExportFormat, Operations, ReportFormat};

const DEFAULT_USAGE_DAYS: u32 = 30;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, VariantNames,
)]
#[strum(serialize_all = "snake_case")]
pub enum ReportingOp {
    Generate,
    Export,
    Usage,
    Trends,
    Statistics,
}

impl ToolOperation for ReportingOp {
    fn params(self) -> ParamSpec {
        match self {
            Self::Generate => ParamSpec::new(&[], &["format"]),
            Self::Export => {
                ParamSpec::new(&[], &["format", "status", "online_only", "tags", "search"])
            }
            Self::Usage => ParamSpec::new(&[], &["days"]),
            Self::Trends | Self::Statistics => ParamSpec::NONE,
        }
    }

    async fn run(self, ops: &Operations, p: &Params) -> Result<Value, CoreError> {
        match self {
            Self::Generate => {
                let format: ReportFormat = p.opt_choice("format")?.unwrap_or_default();
                encode(&ops.reporting.network_report(format).await?)
            }
            Self::Export => {
                let format: ExportFormat = p.opt_choice("format")?.unwrap_or_default();
                let filter = DeviceFilter {
                    status: p.opt_choice("status")?,
                    online_only: p.flag("online_only")?,
                    tags: p.opt_string_list("tags")?.unwrap_or_default(),
                    search: p.opt_str("search")?.map(str::to_owned),
                };
                encode(&ops.reporting.export_devices(format, &filter).await?)
            }
            Self::Usage => {
                let days = p.opt_u32("days")?.unwrap_or(DEFAULT_USAGE_DAYS);
                encode(&ops.analytics.usage(days).await?)
            }
            Self::Trends => encode(&ops.analytics.activity_trends().await?),
            Self::Statistics => encode(&ops.analytics.network_statistics().await?),
        }
    }
}
