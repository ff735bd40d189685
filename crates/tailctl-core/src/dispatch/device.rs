// ── `device` tool ──

use std::time::Duration;

use secrecy::ExposeSecret;
use serde_json::{Value, json};
use strum::{Display, EnumIter, EnumString, VariantNames};

use super::{ParamSpec, Params, Paging, ToolOperation, encode};
use crate::error::CoreError;
use crate::model::UserRole;
use crate::ops::{CreateKeyOptions, DeviceFilter, Operations, SearchField, TagMode};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, VariantNames,
)]
#[strum(serialize_all = "snake_case")]
pub enum DeviceOp {
    List,
    Get,
    Authorize,
    Rename,
    Tag,
    Delete,
    Search,
    Stats,
    ExitNode,
    SubnetRouter,
    UserList,
    UserGet,
    UserRole,
    KeyList,
    KeyGet,
    KeyCreate,
    KeyRevoke,
    KeyAnalyze,
}

impl ToolOperation for DeviceOp {
    fn params(self) -> ParamSpec {
        match self {
            Self::List => ParamSpec::new(
                &[],
                &["status", "online_only", "tags", "search", "limit", "offset"],
            ),
            Self::Get | Self::Delete => ParamSpec::new(&["device_id"], &[]),
            Self::Authorize => ParamSpec::new(&["device_id", "authorized"], &["reason"]),
            Self::Rename => ParamSpec::new(&["device_id", "name"], &[]),
            Self::Tag => ParamSpec::new(&["device_id", "tags"], &["mode"]),
            Self::Search => ParamSpec::new(&["query"], &["fields", "limit", "offset"]),
            Self::Stats | Self::KeyAnalyze => ParamSpec::NONE,
            Self::ExitNode => ParamSpec::new(&["device_id", "enable"], &[]),
            Self::SubnetRouter => ParamSpec::new(&["device_id", "routes"], &[]),
            Self::UserList => ParamSpec::new(&[], &["with_devices", "limit", "offset"]),
            Self::UserGet => ParamSpec::new(&["user_id"], &["with_devices"]),
            Self::UserRole => ParamSpec::new(&["user_id", "role"], &[]),
            Self::KeyList => ParamSpec::new(&[], &["limit", "offset"]),
            Self::KeyGet | Self::KeyRevoke => ParamSpec::new(&["key_id"], &[]),
            Self::KeyCreate => ParamSpec::new(
                &[],
                &[
                    "reusable",
                    "ephemeral",
                    "preauthorized",
                    "tags",
                    "expiry_seconds",
                    "description",
                ],
            ),
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn run(self, ops: &Operations, p: &Params) -> Result<Value, CoreError> {
        match self {
            // ── Devices ──────────────────────────────────────────────
            Self::List => {
                let paging = Paging::from_params(p)?;
                let filter = DeviceFilter {
                    status: p.opt_choice("status")?,
                    online_only: p.flag("online_only")?,
                    tags: p.opt_string_list("tags")?.unwrap_or_default(),
                    search: p.opt_str("search")?.map(str::to_owned),
                };
                paging.apply(ops.devices.list(&filter).await?)
            }
            Self::Get => encode(&ops.devices.get(p.str("device_id")?).await?),
            Self::Authorize => encode(
                &ops.devices
                    .authorize(p.str("device_id")?, p.bool("authorized")?, p.opt_str("reason")?)
                    .await?,
            ),
            Self::Rename => encode(
                &ops.devices
                    .rename(p.str("device_id")?, p.str("name")?)
                    .await?,
            ),
            Self::Tag => {
                let mode: TagMode = p.opt_choice("mode")?.unwrap_or_default();
                encode(
                    &ops.devices
                        .tag(p.str("device_id")?, &p.string_list("tags")?, mode)
                        .await?,
                )
            }
            Self::Delete => {
                let device_id = p.str("device_id")?;
                ops.devices.delete(device_id).await?;
                Ok(json!({"device_id": device_id, "deleted": true}))
            }
            Self::Search => {
                let paging = Paging::from_params(p)?;
                let fields = match p.opt_string_list("fields")? {
                    None => SearchField::DEFAULT.to_vec(),
                    Some(names) => parse_fields(&names)?,
                };
                paging.apply(ops.devices.search(p.str("query")?, &fields).await?)
            }
            Self::Stats => encode(&ops.devices.stats().await?),
            Self::ExitNode => encode(
                &ops.devices
                    .set_exit_node(p.str("device_id")?, p.bool("enable")?)
                    .await?,
            ),
            Self::SubnetRouter => encode(
                &ops.devices
                    .set_subnet_routes(p.str("device_id")?, &p.string_list("routes")?)
                    .await?,
            ),

            // ── Users ────────────────────────────────────────────────
            Self::UserList => {
                let paging = Paging::from_params(p)?;
                paging.apply(ops.users.list(p.flag("with_devices")?).await?)
            }
            Self::UserGet => encode(
                &ops.users
                    .get(p.str("user_id")?, p.flag("with_devices")?)
                    .await?,
            ),
            Self::UserRole => {
                let role: UserRole = p.choice("role")?;
                encode(&ops.users.set_role(p.str("user_id")?, role).await?)
            }

            // ── Auth keys ────────────────────────────────────────────
            Self::KeyList => {
                let paging = Paging::from_params(p)?;
                paging.apply(ops.keys.list().await?)
            }
            Self::KeyGet => encode(&ops.keys.get(p.str("key_id")?).await?),
            Self::KeyCreate => {
                let options = CreateKeyOptions {
                    reusable: p.flag("reusable")?,
                    ephemeral: p.flag("ephemeral")?,
                    preauthorized: p.flag("preauthorized")?,
                    tags: p.opt_string_list("tags")?.unwrap_or_default(),
                    expiry: p.opt_u64("expiry_seconds")?.map(Duration::from_secs),
                    description: p.opt_str("description")?.map(str::to_owned),
                };
                let created = ops.keys.create(&options).await?;
                Ok(json!({
                    "key": encode(&created.key)?,
                    "secret": created.secret.expose_secret(),
                    "notice": "The secret is shown once and cannot be retrieved again.",
                }))
            }
            Self::KeyRevoke => {
                let key_id = p.str("key_id")?;
                ops.keys.revoke(key_id).await?;
                Ok(json!({"key_id": key_id, "revoked": true}))
            }
            Self::KeyAnalyze => encode(&ops.keys.analyze().await?),
        }
    }
}

fn parse_fields(names: &[String]) -> Result<Vec<SearchField>, CoreError> {
    names
        .iter()
        .map(|name| {
            name.parse().map_err(|_| {
                CoreError::validation(
                    "fields",
                    format!(
                        "unknown field '{name}'; expected one of: {}",
                        SearchField::VARIANTS.join(", ")
                    ),
                )
            })
        })
        .collect()
}
