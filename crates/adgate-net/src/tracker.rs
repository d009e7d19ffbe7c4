//! Impression beacons

use adgate_provider::ImpressionTracker;
use adgate_util::{AdError, AdResult, RequestId};
use reqwest::Client;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use url::Url;

/// Fires a GET per impression on the runtime and forgets about it
#[derive(Debug, Clone)]
pub struct HttpImpressionTracker {
    client: Client,
    track_base: Url,
    handle: Handle,
}

impl HttpImpressionTracker {
    /// Must be called from within a tokio runtime
    pub fn new(track_base: &str, timeout: Duration) -> AdResult<Self> {
        let track_base = Url::parse(track_base).map_err(|e| {
            AdError::unspecified(format!("invalid tracking URL '{}': {}", track_base, e))
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdError::unspecified(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            track_base,
            handle: Handle::current(),
        })
    }
}

/// Use the server-supplied URL when it is a usable http(s) URL, otherwise
/// `<track_base>?request_id=<id>&event=impression`
pub fn impression_url(track_base: &Url, request_id: &RequestId, track_url: Option<&str>) -> Url {
    if let Some(raw) = track_url
        && let Ok(url) = Url::parse(raw)
        && matches!(url.scheme(), "http" | "https")
    {
        return url;
    }

    let mut url = track_base.clone();
    url.query_pairs_mut()
        .append_pair("request_id", request_id.as_str())
        .append_pair("event", "impression");
    url
}

impl ImpressionTracker for HttpImpressionTracker {
    fn track_impression(&self, request_id: &RequestId, track_url: Option<&str>) {
        let url = impression_url(&self.track_base, request_id, track_url);
        let client = self.client.clone();
        let request_id = request_id.clone();

        debug!(request_id = %request_id, url = %url, "Tracking impression");

        self.handle.spawn(async move {
            match client.get(url).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(request_id = %request_id, "Impression recorded");
                }
                Ok(response) => {
                    warn!(request_id = %request_id, status = %response.status(), "Impression rejected");
                }
                Err(e) => {
                    warn!(request_id = %request_id, error = %e, "Impression request failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://api.example.com/track").unwrap()
    }

    #[test]
    fn server_track_url_wins() {
        let url = impression_url(
            &base(),
            &RequestId::new("r1"),
            Some("https://cdn.example.com/px?id=r1"),
        );
        assert_eq!(url.as_str(), "https://cdn.example.com/px?id=r1");
    }

    #[test]
    fn falls_back_to_base() {
        let expected = "https://api.example.com/track?request_id=r1&event=impression";

        let url = impression_url(&base(), &RequestId::new("r1"), None);
        assert_eq!(url.as_str(), expected);

        let url = impression_url(&base(), &RequestId::new("r1"), Some("not a url"));
        assert_eq!(url.as_str(), expected);

        let url = impression_url(&base(), &RequestId::new("r1"), Some("javascript:alert(1)"));
        assert_eq!(url.as_str(), expected);
    }

    #[tokio::test]
    async fn tracking_unreachable_host_does_not_block() {
        let tracker =
            HttpImpressionTracker::new("http://127.0.0.1:9/track", Duration::from_millis(50)).unwrap();
        tracker.track_impression(&RequestId::new("r1"), None);
    }
}
