// Service endpoints
//
// Services are named virtual addresses fronting one or more device
// endpoints. Create is retried only when the caller supplies an
// idempotency key.

use tracing::debug;

use crate::client::{ApiClient, ApiRequest};
use crate::error::Error;
use crate::types::{ServiceRequestBody, ServiceResponse};

impl ApiClient {
    /// `GET services` (paginated)
    pub async fn list_services(&self) -> Result<Vec<ServiceResponse>, Error> {
        self.collect_all(ApiRequest::get("services"), "services").await
    }

    /// `GET services/{id}`
    pub async fn get_service(&self, service_id: &str) -> Result<ServiceResponse, Error> {
        self.fetch(&ApiRequest::get(format!("services/{service_id}")))
            .await
    }

    /// `POST services`
    pub async fn create_service(
        &self,
        body: &ServiceRequestBody,
        idempotency_key: Option<&str>,
    ) -> Result<ServiceResponse, Error> {
        debug!(name = %body.name, ?idempotency_key, "creating service");
        let mut request = ApiRequest::post("services", body)?;
        if let Some(key) = idempotency_key {
            request = request.idempotency_key(key);
        }
        self.fetch(&request).await
    }

    /// Full replacement of a service definition.
    ///
    /// `POST services/{id}`
    pub async fn update_service(
        &self,
        service_id: &str,
        body: &ServiceRequestBody,
    ) -> Result<ServiceResponse, Error> {
        debug!(service_id, "updating service");
        let request = ApiRequest::post(format!("services/{service_id}"), body)?.idempotent();
        self.fetch(&request).await
    }

    /// `DELETE services/{id}`
    pub async fn delete_service(&self, service_id: &str) -> Result<(), Error> {
        debug!(service_id, "deleting service");
        self.send(&ApiRequest::delete(format!("services/{service_id}")).idempotent())
            .await
    }
}
