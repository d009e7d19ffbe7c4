//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Identity of this integration
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Local gating thresholds
    #[serde(default)]
    pub gating: RawGatingConfig,

    /// Load/show retry tuning
    #[serde(default)]
    pub retry: RawRetryConfig,

    /// Policy server endpoints
    #[serde(default)]
    pub network: RawNetworkConfig,

    /// Ad slots to manage
    #[serde(default)]
    pub placements: Vec<RawPlacement>,
}

/// Service identity. Both may instead be supplied on the command line or by
/// an `initialize` command.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    pub partner_id: Option<String>,
    pub app_id: Option<String>,
}

/// Local gating thresholds
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawGatingConfig {
    /// Minimum seconds since session start (default 30)
    pub session_gate_seconds: Option<u64>,

    /// Minimum seconds since the last show (default 90)
    pub cooldown_seconds: Option<u64>,

    /// What a server override without a TTL means: "expire" or "persist"
    pub missing_ttl: Option<String>,
}

/// Retry tuning
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRetryConfig {
    /// Base of the load backoff exponent, seconds (default 2)
    pub backoff_base: Option<u32>,

    /// Largest backoff exponent (default 6)
    pub backoff_cap: Option<u32>,

    /// Delay before retrying a gated `show()` (default 10)
    pub show_retry_seconds: Option<u64>,

    /// Delay before recovering from a display failure (default 10)
    pub display_failure_retry_seconds: Option<u64>,
}

/// Network endpoints
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawNetworkConfig {
    /// Policy request endpoint
    pub base_url: Option<String>,

    /// Impression tracking endpoint used when the server omits `track_url`
    pub track_url: Option<String>,

    /// Policy fetch timeout in milliseconds (default 1500)
    pub fetch_timeout_ms: Option<u64>,
}

/// Raw placement definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawPlacement {
    /// Unique stable ID, sent to the server as `placement`
    pub id: String,

    /// Start loading as soon as the service is initialized
    #[serde(default = "default_auto_load")]
    pub auto_load: bool,
}

fn default_auto_load() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            config_version = 1

            [service]
            partner_id = "partner-1"
            app_id = "app-1"

            [gating]
            session_gate_seconds = 20
            cooldown_seconds = 60
            missing_ttl = "persist"

            [retry]
            backoff_base = 2
            backoff_cap = 5
            show_retry_seconds = 5

            [network]
            base_url = "https://ads.example.com/request"
            fetch_timeout_ms = 800

            [[placements]]
            id = "main"

            [[placements]]
            id = "level-end"
            auto_load = false
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.service.partner_id.as_deref(), Some("partner-1"));
        assert_eq!(config.gating.missing_ttl.as_deref(), Some("persist"));
        assert_eq!(config.retry.backoff_cap, Some(5));
        assert_eq!(config.placements.len(), 2);
        assert!(config.placements[0].auto_load);
        assert!(!config.placements[1].auto_load);
    }

    #[test]
    fn sections_are_optional() {
        let config: RawConfig = toml::from_str("config_version = 1").unwrap();
        assert!(config.placements.is_empty());
        assert!(config.gating.cooldown_seconds.is_none());
    }
}
