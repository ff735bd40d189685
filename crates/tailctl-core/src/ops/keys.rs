// ── Auth key operations ──

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tailctl_api::ApiClient;
use tailctl_api::types::{
    CreateKeyBody, KeyCapabilities, KeyCreateCapabilities, KeyDeviceCapabilities,
};
use tracing::info;

use crate::convert::key_from_wire;
use crate::error::CoreError;
use crate::model::{AuthKey, CreatedKey, KeyState};
use crate::ops::devices::{check_tags, require_id};

/// Longest key lifetime the control plane accepts.
pub const MAX_KEY_EXPIRY: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Keys expiring within this window are flagged by [`KeyOps::analyze`].
pub const EXPIRING_SOON: TimeDelta = TimeDelta::days(7);

/// Options for minting a new pre-auth key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct CreateKeyOptions {
    #[serde(default)]
    pub reusable: bool,
    #[serde(default)]
    pub ephemeral: bool,
    #[serde(default)]
    pub preauthorized: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, with = "expiry_secs")]
    pub expiry: Option<Duration>,
    pub description: Option<String>,
}

mod expiry_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

/// Key inventory grouped by lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyAnalysis {
    pub total: usize,
    pub expired: Vec<AuthKey>,
    pub expiring_soon: Vec<AuthKey>,
    pub active: Vec<AuthKey>,
    pub analyzed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct KeyOps {
    api: ApiClient,
}

impl KeyOps {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Every usable or expired key. Revoked and invalid keys are never
    /// returned.
    pub async fn list(&self) -> Result<Vec<AuthKey>, CoreError> {
        let now = Utc::now();
        let keys: Vec<AuthKey> = self
            .api
            .list_keys()
            .await?
            .into_iter()
            .map(|k| key_from_wire(k, now))
            .filter(|k| !k.is_revoked())
            .collect();
        info!(count = keys.len(), "auth keys listed");
        Ok(keys)
    }

    pub async fn get(&self, key_id: &str) -> Result<AuthKey, CoreError> {
        require_id("key_id", key_id)?;
        let raw = self.api.get_key(key_id).await.map_err(|e| {
            if e.is_not_found() {
                CoreError::not_found("key", key_id)
            } else {
                e.into()
            }
        })?;
        Ok(key_from_wire(raw, Utc::now()))
    }

    /// Mint a key. The secret is only available in the returned value.
    pub async fn create(&self, options: &CreateKeyOptions) -> Result<CreatedKey, CoreError> {
        check_tags(&options.tags)?;
        if let Some(expiry) = options.expiry {
            if expiry.is_zero() || expiry > MAX_KEY_EXPIRY {
                return Err(CoreError::validation(
                    "expiry",
                    "must be between 1 second and 90 days",
                ));
            }
        }

        let body = CreateKeyBody {
            capabilities: KeyCapabilities {
                devices: KeyDeviceCapabilities {
                    create: KeyCreateCapabilities {
                        reusable: options.reusable,
                        ephemeral: options.ephemeral,
                        preauthorized: options.preauthorized,
                        tags: options.tags.clone(),
                    },
                },
            },
            expiry_seconds: options.expiry.map(|d| d.as_secs()),
            description: options.description.clone(),
        };

        let mut raw = self.api.create_key(&body).await?;
        let Some(secret) = raw.key.take() else {
            return Err(CoreError::TransientServer {
                status: None,
                message: "key created but the response carried no secret".into(),
                retry: crate::error::RetryInfo::default(),
            });
        };
        let key = key_from_wire(raw, Utc::now());
        info!(key_id = %key.id, reusable = key.reusable, "auth key created");
        Ok(CreatedKey {
            key,
            secret: SecretString::from(secret),
        })
    }

    pub async fn revoke(&self, key_id: &str) -> Result<(), CoreError> {
        require_id("key_id", key_id)?;
        self.api.delete_key(key_id).await.map_err(|e| {
            if e.is_not_found() {
                CoreError::not_found("key", key_id)
            } else {
                e.into()
            }
        })?;
        info!(key_id, "auth key revoked");
        Ok(())
    }

    pub async fn analyze(&self) -> Result<KeyAnalysis, CoreError> {
        let keys = self.list().await?;
        let now = Utc::now();
        let analysis = analyze_keys(keys, now);
        info!(
            total = analysis.total,
            expired = analysis.expired.len(),
            expiring_soon = analysis.expiring_soon.len(),
            "auth keys analyzed"
        );
        Ok(analysis)
    }
}

fn analyze_keys(keys: Vec<AuthKey>, now: DateTime<Utc>) -> KeyAnalysis {
    let mut analysis = KeyAnalysis {
        total: keys.len(),
        analyzed_at: Some(now),
        ..KeyAnalysis::default()
    };
    for key in keys {
        match (key.state, key.expires) {
            (KeyState::Expired, _) => analysis.expired.push(key),
            (_, Some(exp)) if exp - now < EXPIRING_SOON => analysis.expiring_soon.push(key),
            _ => analysis.active.push(key),
        }
    }
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str, state: KeyState, expires: Option<DateTime<Utc>>) -> AuthKey {
        AuthKey {
            id: id.into(),
            description: None,
            created: None,
            expires,
            last_used: None,
            reusable: false,
            ephemeral: false,
            preauthorized: false,
            tags: Vec::new(),
            state,
        }
    }

    #[test]
    fn keys_are_grouped_by_lifetime() {
        let now = Utc::now();
        let analysis = analyze_keys(
            vec![
                key("old", KeyState::Expired, Some(now - TimeDelta::days(1))),
                key("soon", KeyState::Active, Some(now + TimeDelta::days(3))),
                key("later", KeyState::Active, Some(now + TimeDelta::days(60))),
                key("forever", KeyState::Active, None),
            ],
            now,
        );
        assert_eq!(analysis.total, 4);
        assert_eq!(analysis.expired[0].id, "old");
        assert_eq!(analysis.expiring_soon[0].id, "soon");
        assert_eq!(analysis.active.len(), 2);
    }
}
