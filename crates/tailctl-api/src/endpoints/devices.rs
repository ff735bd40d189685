// Device endpoints
//
// Listing, lookup, authorization, naming, tagging, routes and removal.

use futures_util::Stream;
use serde_json::json;
use tracing::debug;

use crate::client::{ApiClient, ApiRequest};
use crate::error::Error;
use crate::types::{DeviceResponse, DeviceRoutesResponse};

impl ApiClient {
    /// Page through every device with all fields populated.
    ///
    /// `GET devices?fields=all`
    pub fn device_pages(&self) -> impl Stream<Item = Result<Vec<DeviceResponse>, Error>> + Send + '_ {
        self.pages(ApiRequest::get("devices").query("fields", "all"), "devices")
    }

    /// List all devices in server order.
    pub async fn list_devices(&self) -> Result<Vec<DeviceResponse>, Error> {
        debug!("listing devices");
        self.collect_all(ApiRequest::get("devices").query("fields", "all"), "devices")
            .await
    }

    /// `GET devices/{id}?fields=all`
    pub async fn get_device(&self, device_id: &str) -> Result<DeviceResponse, Error> {
        self.fetch(&ApiRequest::get(format!("devices/{device_id}")).query("fields", "all"))
            .await
    }

    /// Approve or revoke a device's access to the tailnet.
    ///
    /// `POST devices/{id}/authorized` with `{"authorized": bool}`
    pub async fn set_device_authorized(&self, device_id: &str, authorized: bool) -> Result<(), Error> {
        debug!(device_id, authorized, "setting device authorization");
        let request = ApiRequest::post(
            format!("devices/{device_id}/authorized"),
            &json!({ "authorized": authorized }),
        )?
        .idempotent();
        self.send(&request).await
    }

    /// `POST devices/{id}/name` with `{"name": "..."}`
    pub async fn set_device_name(&self, device_id: &str, name: &str) -> Result<(), Error> {
        debug!(device_id, name, "renaming device");
        let request =
            ApiRequest::post(format!("devices/{device_id}/name"), &json!({ "name": name }))?
                .idempotent();
        self.send(&request).await
    }

    /// Replace the device's full tag set.
    ///
    /// `POST devices/{id}/tags` with `{"tags": [...]}`
    pub async fn set_device_tags(&self, device_id: &str, tags: &[String]) -> Result<(), Error> {
        debug!(device_id, ?tags, "setting device tags");
        let request =
            ApiRequest::post(format!("devices/{device_id}/tags"), &json!({ "tags": tags }))?
                .idempotent();
        self.send(&request).await
    }

    /// `GET devices/{id}/routes`
    pub async fn get_device_routes(&self, device_id: &str) -> Result<DeviceRoutesResponse, Error> {
        self.fetch(&ApiRequest::get(format!("devices/{device_id}/routes")))
            .await
    }

    /// Replace the set of enabled subnet/exit routes.
    ///
    /// `POST devices/{id}/routes` with `{"routes": [...]}`
    pub async fn set_device_routes(
        &self,
        device_id: &str,
        routes: &[String],
    ) -> Result<(), Error> {
        debug!(device_id, ?routes, "setting device routes");
        let request = ApiRequest::post(
            format!("devices/{device_id}/routes"),
            &json!({ "routes": routes }),
        )?
        .idempotent();
        self.send(&request).await
    }

    /// `DELETE devices/{id}`
    pub async fn delete_device(&self, device_id: &str) -> Result<(), Error> {
        debug!(device_id, "deleting device");
        self.send(&ApiRequest::delete(format!("devices/{device_id}")).idempotent())
            .await
    }
}
