//! Validated settings structures

use crate::schema::{RawConfig, RawGatingConfig, RawNetworkConfig, RawPlacement, RawRetryConfig};
use crate::validation::parse_missing_ttl;
use adgate_util::{AppId, ExponentialBackoff, PartnerId, PlacementId};
use std::time::Duration;

/// Default policy request endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.adw.net/applovin/request";

/// Default impression tracking endpoint
pub const DEFAULT_TRACK_URL: &str = "https://api.adw.net/applovin/track";

/// Validated settings ready for use by the core and the service
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub service: ServiceConfig,
    pub gating: GatingPolicy,
    pub retry: RetryPolicy,
    pub network: NetworkConfig,
    pub placements: Vec<Placement>,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig {
                partner_id: raw.service.partner_id.map(PartnerId::new),
                app_id: raw.service.app_id.map(AppId::new),
            },
            gating: GatingPolicy::from_raw(raw.gating),
            retry: RetryPolicy::from_raw(raw.retry),
            network: NetworkConfig::from_raw(raw.network),
            placements: raw.placements.into_iter().map(Placement::from_raw).collect(),
        }
    }

    /// Get placement by ID
    pub fn get_placement(&self, id: &PlacementId) -> Option<&Placement> {
        self.placements.iter().find(|p| &p.id == id)
    }
}

/// Identity used for policy requests
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub partner_id: Option<PartnerId>,
    pub app_id: Option<AppId>,
}

/// How to treat a server override that arrives without a TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingTtlPolicy {
    /// The override is already expired; the next gate read clears it
    #[default]
    Expire,
    /// The override stays in force until replaced
    Persist,
}

/// Local gating thresholds
#[derive(Debug, Clone)]
pub struct GatingPolicy {
    pub session_gate: Duration,
    pub cooldown: Duration,
    pub missing_ttl: MissingTtlPolicy,
}

impl GatingPolicy {
    pub const DEFAULT_SESSION_GATE: Duration = Duration::from_secs(30);
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(90);

    fn from_raw(raw: RawGatingConfig) -> Self {
        let defaults = Self::default();
        Self {
            session_gate: raw
                .session_gate_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_gate),
            cooldown: raw
                .cooldown_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.cooldown),
            missing_ttl: raw
                .missing_ttl
                .as_deref()
                .and_then(|s| parse_missing_ttl(s).ok())
                .unwrap_or_default(),
        }
    }
}

impl Default for GatingPolicy {
    fn default() -> Self {
        Self {
            session_gate: Self::DEFAULT_SESSION_GATE,
            cooldown: Self::DEFAULT_COOLDOWN,
            missing_ttl: MissingTtlPolicy::default(),
        }
    }
}

/// Retry tuning for slot controllers
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub backoff: ExponentialBackoff,
    /// Delay before a gated `show()` is tried again
    pub show_retry_delay: Duration,
    /// Delay before recovering from a display failure
    pub display_failure_retry_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_SHOW_RETRY: Duration = Duration::from_secs(10);
    pub const DEFAULT_DISPLAY_FAILURE_RETRY: Duration = Duration::from_secs(10);

    fn from_raw(raw: RawRetryConfig) -> Self {
        let defaults = Self::default();
        Self {
            backoff: ExponentialBackoff::new(
                raw.backoff_base.unwrap_or(defaults.backoff.base()),
                raw.backoff_cap.unwrap_or(defaults.backoff.cap()),
            ),
            show_retry_delay: raw
                .show_retry_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.show_retry_delay),
            display_failure_retry_delay: raw
                .display_failure_retry_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.display_failure_retry_delay),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: ExponentialBackoff::default(),
            show_retry_delay: Self::DEFAULT_SHOW_RETRY,
            display_failure_retry_delay: Self::DEFAULT_DISPLAY_FAILURE_RETRY,
        }
    }
}

/// Network endpoints
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub base_url: String,
    pub track_url: String,
    pub fetch_timeout: Duration,
}

impl NetworkConfig {
    pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(1500);

    fn from_raw(raw: RawNetworkConfig) -> Self {
        Self {
            base_url: raw.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            track_url: raw.track_url.unwrap_or_else(|| DEFAULT_TRACK_URL.to_string()),
            fetch_timeout: raw
                .fetch_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(Self::DEFAULT_FETCH_TIMEOUT),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            track_url: DEFAULT_TRACK_URL.to_string(),
            fetch_timeout: Self::DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Validated placement
#[derive(Debug, Clone)]
pub struct Placement {
    pub id: PlacementId,
    pub auto_load: bool,
}

impl Placement {
    fn from_raw(raw: RawPlacement) -> Self {
        Self {
            id: PlacementId::new(raw.id),
            auto_load: raw.auto_load,
        }
    }
}
