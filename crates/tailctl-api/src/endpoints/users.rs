// User endpoints

use serde_json::json;
use tracing::debug;

use crate::client::{ApiClient, ApiRequest};
use crate::error::Error;
use crate::types::UserResponse;

impl ApiClient {
    /// `GET users` (paginated)
    pub async fn list_users(&self) -> Result<Vec<UserResponse>, Error> {
        self.collect_all(ApiRequest::get("users"), "users").await
    }

    /// `GET users/{id}`
    pub async fn get_user(&self, user_id: &str) -> Result<UserResponse, Error> {
        self.fetch(&ApiRequest::get(format!("users/{user_id}"))).await
    }

    /// `POST users/{id}/role` with `{"role": "..."}`
    pub async fn set_user_role(&self, user_id: &str, role: &str) -> Result<(), Error> {
        debug!(user_id, role, "changing user role");
        let request =
            ApiRequest::post(format!("users/{user_id}/role"), &json!({ "role": role }))?
                .idempotent();
        self.send(&request).await
    }
}
