//! Server policy payload

use serde::{Deserialize, Serialize};

/// Policy returned by the ad server for a placement request.
///
/// `allow = false` responses usually omit `final_url` and `ttl`. Numeric
/// fields are seconds and are kept signed: the server is not trusted to send
/// positive values, and resolution in the core decides what a non-positive
/// value means.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyUpdate {
    #[serde(default)]
    pub request_id: Option<String>,

    /// Landing URL of the approved ad
    #[serde(default)]
    pub final_url: Option<String>,

    /// Validity window of the cooldown/session-gate overrides
    #[serde(default)]
    pub ttl: Option<i64>,

    /// Whether the server approved a presentation
    pub allow: bool,

    #[serde(default)]
    pub cooldown_sec: Option<i64>,

    #[serde(default)]
    pub session_gate: Option<i64>,

    #[serde(default)]
    pub fallback: Option<bool>,

    #[serde(default)]
    pub track_url: Option<String>,
}

impl PolicyUpdate {
    /// Decode a response body
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// True if the server approved and supplied something to present
    pub fn has_offer(&self) -> bool {
        self.allow && self.final_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_full_response() {
        let body = br#"{
            "request_id": "req-42",
            "final_url": "https://example.com/landing",
            "ttl": 3600,
            "allow": true,
            "cooldown_sec": 60,
            "session_gate": 30,
            "fallback": false,
            "track_url": "https://example.com/track?request_id=req-42&event=impression"
        }"#;

        let update = PolicyUpdate::from_json(body).unwrap();
        assert_eq!(update.request_id.as_deref(), Some("req-42"));
        assert_eq!(update.ttl, Some(3600));
        assert_eq!(update.cooldown_sec, Some(60));
        assert_eq!(update.session_gate, Some(30));
        assert!(update.has_offer());
    }

    #[test]
    fn decode_declined_response() {
        let update = PolicyUpdate::from_json(br#"{"allow": false, "cooldown_sec": 120}"#).unwrap();
        assert!(!update.allow);
        assert_eq!(update.final_url, None);
        assert_eq!(update.ttl, None);
        assert!(!update.has_offer());
    }

    #[test]
    fn missing_allow_is_a_decoding_error() {
        assert!(PolicyUpdate::from_json(br#"{"ttl": 10}"#).is_err());
        assert!(PolicyUpdate::from_json(b"").is_err());
        assert!(PolicyUpdate::from_json(b"<html>").is_err());
    }

    #[test]
    fn allow_without_url_has_no_offer() {
        let update = PolicyUpdate {
            allow: true,
            final_url: Some(String::new()),
            ..Default::default()
        };
        assert!(!update.has_offer());
    }
}
