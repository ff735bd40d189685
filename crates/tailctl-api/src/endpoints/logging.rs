// Configuration audit log endpoint

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::Stream;

use crate::client::{ApiClient, ApiRequest};
use crate::error::Error;
use crate::types::AuditLogResponse;

fn audit_request(start: DateTime<Utc>, end: DateTime<Utc>) -> ApiRequest {
    ApiRequest::get("logging/configuration")
        .query("start", start.to_rfc3339_opts(SecondsFormat::Secs, true))
        .query("end", end.to_rfc3339_opts(SecondsFormat::Secs, true))
}

impl ApiClient {
    /// Page through configuration audit events in `[start, end]`.
    ///
    /// `GET logging/configuration?start=...&end=...`
    pub fn audit_log_pages(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Stream<Item = Result<Vec<AuditLogResponse>, Error>> + Send + '_ {
        self.pages(audit_request(start, end), "logs")
    }

    pub async fn list_audit_logs(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AuditLogResponse>, Error> {
        self.collect_all(audit_request(start, end), "logs").await
    }
}
