// ── Service operations ──

use tailctl_api::ApiClient;
use tailctl_api::types::ServiceRequestBody;
use tracing::info;
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{Service, ServiceSpec};
use crate::ops::devices::require_id;

#[derive(Debug, Clone)]
pub struct ServiceOps {
    api: ApiClient,
}

fn not_found(service_id: &str) -> impl FnOnce(tailctl_api::Error) -> CoreError + '_ {
    move |e| {
        if e.is_not_found() {
            CoreError::not_found("service", service_id)
        } else {
            e.into()
        }
    }
}

impl ServiceOps {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn list(&self) -> Result<Vec<Service>, CoreError> {
        let services: Vec<Service> = self
            .api
            .list_services()
            .await?
            .into_iter()
            .map(Service::from)
            .collect();
        info!(count = services.len(), "services listed");
        Ok(services)
    }

    pub async fn get(&self, service_id: &str) -> Result<Service, CoreError> {
        require_id("service_id", service_id)?;
        let raw = self
            .api
            .get_service(service_id)
            .await
            .map_err(not_found(service_id))?;
        Ok(Service::from(raw))
    }

    /// Create a service. The request carries an idempotency key (a fresh
    /// UUID when none is given) so transient failures can be retried
    /// without creating duplicates.
    pub async fn create(
        &self,
        spec: &ServiceSpec,
        idempotency_key: Option<&str>,
    ) -> Result<Service, CoreError> {
        spec.validate()?;
        let key = idempotency_key
            .filter(|k| !k.trim().is_empty())
            .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);

        let body = ServiceRequestBody::from(spec);
        let created = Service::from(self.api.create_service(&body, Some(&key)).await?);
        info!(service_id = %created.id, name = %created.name, "service created");
        Ok(created)
    }

    /// Replace a service definition.
    pub async fn update(&self, service_id: &str, spec: &ServiceSpec) -> Result<Service, CoreError> {
        require_id("service_id", service_id)?;
        spec.validate()?;
        let body = ServiceRequestBody::from(spec);
        let raw = self
            .api
            .update_service(service_id, &body)
            .await
            .map_err(not_found(service_id))?;
        info!(service_id, "service updated");
        Ok(Service::from(raw))
    }

    pub async fn delete(&self, service_id: &str) -> Result<(), CoreError> {
        require_id("service_id", service_id)?;
        self.api
            .delete_service(service_id)
            .await
            .map_err(not_found(service_id))?;
        info!(service_id, "service deleted");
        Ok(())
    }
}
