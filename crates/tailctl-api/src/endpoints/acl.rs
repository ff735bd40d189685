// ACL policy endpoints
//
// The stored document is versioned by its `ETag`; writes send it back as
// `If-Match` so a concurrent edit surfaces as a conflict instead of being
// overwritten.

use serde_json::Value;
use tracing::{debug, warn};

use crate::client::{ApiClient, ApiRequest, ApiResponse};
use crate::error::Error;
use crate::types::{AclDocument, AclPolicyBody, AclValidateResponse};

impl ApiClient {
    /// `GET acl`
    pub async fn get_acl(&self) -> Result<AclDocument, Error> {
        let response = self.execute(&ApiRequest::get("acl")).await?;
        Ok(AclDocument {
            policy: response.json()?,
            etag: response.etag,
        })
    }

    /// Dry-run a policy against the control plane's validator.
    ///
    /// `POST acl/validate`. Never changes the stored policy, so it is
    /// retried like a read.
    pub async fn validate_acl(&self, policy: &AclPolicyBody) -> Result<AclValidateResponse, Error> {
        let request = ApiRequest::post("acl/validate", policy)?.idempotent();
        let response = self.execute(&request).await?;
        Ok(response.json::<Option<AclValidateResponse>>()?.unwrap_or_default())
    }

    /// Replace the stored policy.
    ///
    /// `POST acl`, conditional on `if_match` when given. Not retried: a
    /// replay after an ambiguous failure could clobber a newer revision.
    /// Returns [`Error::PartialApply`] when the server reports that the
    /// policy reached only part of the tailnet.
    pub async fn update_acl(
        &self,
        policy: &AclPolicyBody,
        if_match: Option<&str>,
    ) -> Result<AclDocument, Error> {
        debug!(rules = policy.acls.len(), ?if_match, "updating ACL policy");
        let mut request = ApiRequest::post("acl", policy)?;
        if let Some(etag) = if_match {
            request = request.if_match(etag);
        }

        let response = self.execute(&request).await?;
        check_partial_apply(&response)?;

        let mut stored: AclPolicyBody = if response.body.trim().is_empty() {
            policy.clone()
        } else {
            response.json()?
        };
        stored.extra.remove("partial");
        Ok(AclDocument {
            policy: stored,
            etag: response.etag,
        })
    }
}

fn check_partial_apply(response: &ApiResponse) -> Result<(), Error> {
    let flagged = response.status == 207
        || response
            .json::<Value>()
            .ok()
            .and_then(|v| v.get("partial").and_then(Value::as_bool))
            .unwrap_or(false);

    if flagged {
        let message = response
            .json::<Value>()
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
            .unwrap_or_else(|| "some nodes have not received the new policy".to_owned());
        warn!(status = response.status, %message, "ACL policy partially applied");
        return Err(Error::PartialApply { message });
    }
    Ok(())
}
