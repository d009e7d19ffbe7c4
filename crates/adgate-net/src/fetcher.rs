//! Policy fetch over HTTP

use adgate_api::PolicyUpdate;
use adgate_provider::PolicyFetcher;
use adgate_util::{AdError, AdResult, AppId, PartnerId, PlacementId};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Fetches placement policy with a single GET.
///
/// `GET <base_url>?partner_id=..&app_id=..&placement=..` with a short
/// timeout. Transport failures, timeouts and non-2xx statuses map to
/// `NetworkUnavailable`; an empty or malformed body maps to `DecodingError`.
#[derive(Debug, Clone)]
pub struct HttpPolicyFetcher {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpPolicyFetcher {
    pub fn new(base_url: &str, timeout: Duration) -> AdResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AdError::unspecified(format!("invalid policy URL '{}': {}", base_url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AdError::unspecified(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

/// Build the policy request URL, keeping any query already on `base`
pub fn policy_request_url(
    base: &Url,
    partner_id: &PartnerId,
    app_id: &AppId,
    placement: &PlacementId,
) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair("partner_id", partner_id.as_str())
        .append_pair("app_id", app_id.as_str())
        .append_pair("placement", placement.as_str());
    url
}

#[async_trait]
impl PolicyFetcher for HttpPolicyFetcher {
    async fn fetch(
        &self,
        partner_id: &PartnerId,
        app_id: &AppId,
        placement: &PlacementId,
    ) -> AdResult<PolicyUpdate> {
        let url = policy_request_url(&self.base_url, partner_id, app_id, placement);
        debug!(url = %url, "Fetching placement policy");

        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "Policy request failed");
                AdError::network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "Policy request rejected");
            return Err(AdError::network(format!("server returned {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AdError::network(format!("failed to read body: {}", e)))?;

        decode_policy(&body)
    }
}

/// Decode a policy response body
pub fn decode_policy(body: &[u8]) -> AdResult<PolicyUpdate> {
    if body.is_empty() {
        return Err(AdError::decoding("empty response body"));
    }
    PolicyUpdate::from_json(body).map_err(|e| AdError::decoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_url_carries_identity_and_placement() {
        let base = Url::parse("https://api.example.com/request").unwrap();
        let url = policy_request_url(
            &base,
            &PartnerId::new("p 1"),
            &AppId::new("app"),
            &PlacementId::new("level-end"),
        );

        assert_eq!(
            url.as_str(),
            "https://api.example.com/request?partner_id=p+1&app_id=app&placement=level-end"
        );
    }

    #[test]
    fn request_url_keeps_existing_query() {
        let base = Url::parse("https://api.example.com/request?v=2").unwrap();
        let url = policy_request_url(
            &base,
            &PartnerId::new("p"),
            &AppId::new("a"),
            &PlacementId::new("main"),
        );

        let pairs: Vec<_> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        assert_eq!(pairs, vec!["v", "partner_id", "app_id", "placement"]);
    }

    #[test]
    fn decode_errors() {
        assert!(matches!(decode_policy(b""), Err(AdError::DecodingError(_))));
        assert!(matches!(decode_policy(b"{\"ttl\":1}"), Err(AdError::DecodingError(_))));
        assert!(decode_policy(br#"{"allow":true}"#).unwrap().allow);
    }

    #[test]
    fn invalid_base_url_rejected() {
        assert!(HttpPolicyFetcher::new("not a url", Duration::from_millis(1500)).is_err());
    }
}
