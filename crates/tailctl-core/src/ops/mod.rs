// ── Operations modules ──
//
// One struct per concern, each holding its own `ApiClient` handle. Reads
// always go to the control plane; the only state kept between calls is the
// policy rollback snapshot, shared by every clone of `PolicyOps`.

pub mod analytics;
pub mod audit;
pub mod devices;
pub mod keys;
pub mod network;
pub mod policies;
pub mod policy_analysis;
pub mod reporting;
pub mod services;
pub mod tags;
pub mod users;

use chrono::Utc;
use tailctl_api::ApiClient;
use tokio_util::sync::CancellationToken;

use crate::convert::device_from_wire;
use crate::error::CoreError;
use crate::liveness::LivenessPolicy;
use crate::model::Device;

pub use analytics::AnalyticsOps;
pub use audit::{AuditFilter, AuditOps, DeviceAuditFilter};
pub use devices::{DeviceFilter, DeviceOps, DeviceStats, SearchField, TagMode};
pub use keys::{CreateKeyOptions, KeyAnalysis, KeyOps};
pub use network::NetworkOps;
pub use policies::{AccessDecision, PolicyOps};
pub use policy_analysis::{PolicyAnalysisOps, PolicyQuery};
pub use reporting::{ExportFormat, ReportFormat, ReportingOps};
pub use services::ServiceOps;
pub use tags::{BatchOutcome, ItemError, ItemOutcome, TagOps};
pub use users::UserOps;

/// Every operations module, bound to one client.
#[derive(Debug, Clone)]
pub struct Operations {
    pub devices: DeviceOps,
    pub network: NetworkOps,
    pub services: ServiceOps,
    pub policies: PolicyOps,
    pub audit: AuditOps,
    pub tags: TagOps,
    pub keys: KeyOps,
    pub users: UserOps,
    pub policy_analysis: PolicyAnalysisOps,
    pub analytics: AnalyticsOps,
    pub reporting: ReportingOps,
}

impl Operations {
    pub fn new(api: ApiClient, liveness: LivenessPolicy) -> Self {
        Self::assemble(&api, liveness, PolicyOps::new(api.clone()))
    }

    fn assemble(api: &ApiClient, liveness: LivenessPolicy, policies: PolicyOps) -> Self {
        let devices = DeviceOps::new(api.clone(), liveness);
        Self {
            network: NetworkOps::new(api.clone()),
            services: ServiceOps::new(api.clone()),
            audit: AuditOps::new(devices.clone()),
            tags: TagOps::new(devices.clone()),
            keys: KeyOps::new(api.clone()),
            users: UserOps::new(devices.clone()),
            policy_analysis: PolicyAnalysisOps::new(policies.clone(), devices.clone()),
            analytics: AnalyticsOps::new(devices.clone()),
            reporting: ReportingOps::new(devices.clone(), policies.clone()),
            policies,
            devices,
        }
    }

    /// A copy whose calls abort when `token` is cancelled. The policy
    /// rollback snapshot stays shared with `self`.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        let api = self.devices.api().with_cancellation(token);
        let policies = self.policies.with_client(api.clone());
        Self::assemble(&api, self.devices.liveness(), policies)
    }

    pub fn api(&self) -> &ApiClient {
        self.devices.api()
    }
}

/// Fetch and convert every device, in server order.
pub(crate) async fn load_devices(
    api: &ApiClient,
    liveness: LivenessPolicy,
) -> Result<Vec<Device>, CoreError> {
    let raw = api.list_devices().await?;
    let now = Utc::now();
    Ok(raw
        .into_iter()
        .map(|d| device_from_wire(d, now, liveness))
        .collect())
}
