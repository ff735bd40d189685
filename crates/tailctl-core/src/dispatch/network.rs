// ── `network` tool ──

use serde_json::{Value, json};
use strum::{Display, EnumIter, EnumString, VariantNames};

use super::{ParamSpec, Params, Paging, ToolOperation, encode};
use crate::error::CoreError;
use crate::model::ServiceSpec;
use crate::ops::Operations;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, VariantNames,
)]
#[strum(serialize_all = "snake_case")]
pub enum NetworkOp {
    DnsConfig,
    Nameservers,
    MagicDns,
    SearchPaths,
    ServiceList,
    ServiceGet,
    ServiceCreate,
    ServiceUpdate,
    ServiceDelete,
}

impl ToolOperation for NetworkOp {
    fn params(self) -> ParamSpec {
        match self {
            Self::DnsConfig => ParamSpec::NONE,
            Self::Nameservers => ParamSpec::new(&["nameservers"], &[]),
            Self::MagicDns => ParamSpec::new(&["enabled"], &[]),
            Self::SearchPaths => ParamSpec::new(&["search_paths"], &[]),
            Self::ServiceList => ParamSpec::new(&[], &["limit", "offset"]),
            Self::ServiceGet | Self::ServiceDelete => ParamSpec::new(&["service_id"], &[]),
            Self::ServiceCreate => ParamSpec::new(&["service"], &["idempotency_key"]),
            Self::ServiceUpdate => ParamSpec::new(&["service_id", "service"], &[]),
        }
    }

    async fn run(self, ops: &Operations, p: &Params) -> Result<Value, CoreError> {
        match self {
            Self::DnsConfig => encode(&ops.network.dns_config().await?),
            Self::Nameservers => {
                let applied = ops
                    .network
                    .set_nameservers(&p.string_list("nameservers")?)
                    .await?;
                Ok(json!({ "nameservers": applied }))
            }
            Self::MagicDns => {
                let enabled = ops.network.set_magic_dns(p.bool("enabled")?).await?;
                Ok(json!({ "magic_dns": enabled }))
            }
            Self::SearchPaths => {
                let applied = ops
                    .network
                    .set_search_paths(&p.string_list("search_paths")?)
                    .await?;
                Ok(json!({ "search_paths": applied }))
            }
            Self::ServiceList => {
                let paging = Paging::from_params(p)?;
                paging.apply(ops.services.list().await?)
            }
            Self::ServiceGet => encode(&ops.services.get(p.str("service_id")?).await?),
            Self::ServiceCreate => {
                let spec: ServiceSpec = p.decode("service")?;
                encode(
                    &ops.services
                        .create(&spec, p.opt_str("idempotency_key")?)
                        .await?,
                )
            }
            Self::ServiceUpdate => {
                let spec: ServiceSpec = p.decode("service")?;
                encode(&ops.services.update(p.str("service_id")?, &spec).await?)
            }
            Self::ServiceDelete => {
                let service_id = p.str("service_id")?;
                ops.services.delete(service_id).await?;
                Ok(json!({"service_id": service_id, "deleted": true}))
            }
        }
    }
}
