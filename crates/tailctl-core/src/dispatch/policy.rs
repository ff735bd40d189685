// ── `policy` tool ──

use serde_json::{Value, json};
use strum::{Display, EnumIter, EnumString, VariantNames};

use super::{ParamSpec, Params, ToolOperation, encode};
use crate::error::CoreError;
use crate::model::{PolicyDocument, RuleAction};
use crate::ops::{Operations, PolicyQuery};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, VariantNames,
)]
#[strum(serialize_all = "snake_case")]
pub enum PolicyOp {
    Get,
    Validate,
    Update,
    Rollback,
    Test,
    Analyze,
    AffectedDevices,
    Query,
}

impl ToolOperation for PolicyOp {
    fn params(self) -> ParamSpec {
        match self {
            Self::Get | Self::Rollback | Self::Analyze => ParamSpec::NONE,
            Self::Validate => ParamSpec::new(&["policy"], &[]),
            Self::Update => ParamSpec::new(&["policy"], &["expected_revision"]),
            Self::Test => ParamSpec::new(&["src", "dst"], &["policy"]),
            Self::AffectedDevices => ParamSpec::new(&[], &["action"]),
            Self::Query => ParamSpec::new(
                &[],
                &["action", "src_contains", "dst_contains", "has_src", "has_dst"],
            ),
        }
    }

    async fn run(self, ops: &Operations, p: &Params) -> Result<Value, CoreError> {
        match self {
            Self::Get => encode(&ops.policies.get().await?),
            Self::Validate => {
                let doc: PolicyDocument = p.decode("policy")?;
                let validation = ops.policies.validate(&doc).await?;
                Ok(json!({
                    "valid": validation.is_valid(),
                    "validation": encode(&validation)?,
                }))
            }
            Self::Update => {
                let doc: PolicyDocument = p.decode("policy")?;
                encode(
                    &ops.policies
                        .update(&doc, p.opt_str("expected_revision")?)
                        .await?,
                )
            }
            Self::Rollback => encode(&ops.policies.rollback().await?),
            Self::Test => {
                let doc: Option<PolicyDocument> = p.opt_decode("policy")?;
                encode(
                    &ops.policies
                        .test_access(doc.as_ref(), p.str("src")?, p.str("dst")?)
                        .await?,
                )
            }
            Self::Analyze => encode(&ops.policy_analysis.analyze().await?),
            Self::AffectedDevices => {
                let action = p.opt_str("action")?.map(RuleAction::parse);
                encode(
                    &ops.policy_analysis
                        .affected_devices(action.as_ref())
                        .await?,
                )
            }
            Self::Query => {
                let query = PolicyQuery {
                    action: p.opt_str("action")?.map(RuleAction::parse),
                    src_contains: p.opt_str("src_contains")?.map(str::to_owned),
                    dst_contains: p.opt_str("dst_contains")?.map(str::to_owned),
                    has_src: p.flag("has_src")?,
                    has_dst: p.flag("has_dst")?,
                };
                let rules = ops.policy_analysis.query(&query).await?;
                Ok(json!({
                    "count": rules.len(),
                    "rules": encode(&rules)?,
                }))
            }
        }
    }
}
