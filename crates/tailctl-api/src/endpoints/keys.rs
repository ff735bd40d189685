// Auth key endpoints

use tracing::debug;

use crate::client::{ApiClient, ApiRequest};
use crate::error::Error;
use crate::types::{CreateKeyBody, KeyResponse};

impl ApiClient {
    /// `GET keys?all=true` (paginated). Includes revoked and expired keys;
    /// filtering is the caller's concern.
    pub async fn list_keys(&self) -> Result<Vec<KeyResponse>, Error> {
        self.collect_all(ApiRequest::get("keys").query("all", "true"), "keys")
            .await
    }

    /// `GET keys/{id}`
    pub async fn get_key(&self, key_id: &str) -> Result<KeyResponse, Error> {
        self.fetch(&ApiRequest::get(format!("keys/{key_id}"))).await
    }

    /// `POST keys`. Never retried: a replay would mint a second key.
    pub async fn create_key(&self, body: &CreateKeyBody) -> Result<KeyResponse, Error> {
        debug!(
            reusable = body.capabilities.devices.create.reusable,
            expiry_seconds = ?body.expiry_seconds,
            "creating auth key"
        );
        self.fetch(&ApiRequest::post("keys", body)?).await
    }

    /// `DELETE keys/{id}`
    pub async fn delete_key(&self, key_id: &str) -> Result<(), Error> {
        debug!(key_id, "revoking auth key");
        self.send(&ApiRequest::delete(format!("keys/{key_id}")).idempotent())
            .await
    }
}
