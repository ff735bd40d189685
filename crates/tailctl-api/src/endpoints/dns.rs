// DNS endpoints: nameservers, MagicDNS preference and search paths.

use tracing::debug;

use crate::client::{ApiClient, ApiRequest};
use crate::error::Error;
use crate::types::{DnsPreferencesBody, NameserversBody, SearchPathsBody};

impl ApiClient {
    /// `GET dns/nameservers`
    pub async fn get_nameservers(&self) -> Result<Vec<String>, Error> {
        let body: NameserversBody = self.fetch(&ApiRequest::get("dns/nameservers")).await?;
        Ok(body.dns)
    }

    /// `POST dns/nameservers`; replaces the whole list.
    pub async fn set_nameservers(&self, nameservers: &[String]) -> Result<Vec<String>, Error> {
        debug!(?nameservers, "setting nameservers");
        let body = NameserversBody {
            dns: nameservers.to_vec(),
        };
        let request = ApiRequest::post("dns/nameservers", &body)?.idempotent();
        let response = self.execute(&request).await?;
        Ok(response
            .json::<Option<NameserversBody>>()?
            .map_or(body.dns, |b| b.dns))
    }

    /// `GET dns/preferences`
    pub async fn get_dns_preferences(&self) -> Result<DnsPreferencesBody, Error> {
        self.fetch(&ApiRequest::get("dns/preferences")).await
    }

    /// `POST dns/preferences`
    pub async fn set_dns_preferences(
        &self,
        preferences: DnsPreferencesBody,
    ) -> Result<DnsPreferencesBody, Error> {
        debug!(magic_dns = preferences.magic_dns, "setting DNS preferences");
        let request = ApiRequest::post("dns/preferences", &preferences)?.idempotent();
        let response = self.execute(&request).await?;
        Ok(response
            .json::<Option<DnsPreferencesBody>>()?
            .unwrap_or(preferences))
    }

    /// `GET dns/searchpaths`
    pub async fn get_search_paths(&self) -> Result<Vec<String>, Error> {
        let body: SearchPathsBody = self.fetch(&ApiRequest::get("dns/searchpaths")).await?;
        Ok(body.search_paths)
    }

    /// `POST dns/searchpaths`; replaces the whole list.
    pub async fn set_search_paths(&self, search_paths: &[String]) -> Result<Vec<String>, Error> {
        debug!(?search_paths, "setting DNS search paths");
        let body = SearchPathsBody {
            search_paths: search_paths.to_vec(),
        };
        let request = ApiRequest::post("dns/searchpaths", &body)?.idempotent();
        let response = self.execute(&request).await?;
        Ok(response
            .json::<Option<SearchPathsBody>>()?
            .map_or(body.search_paths, |b| b.search_paths))
    }
}
