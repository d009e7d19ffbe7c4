//! Gating thresholds: local defaults plus a TTL-bound server override

use adgate_api::{ServerOverrideView, ThresholdSource};
use adgate_config::{GatingPolicy, MissingTtlPolicy};
use adgate_util::MonotonicInstant;
use std::time::Duration;
use tracing::{debug, info};

/// Validity window of a server override
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideTtl {
    /// Live while `now - updated_at <= window`
    Window(Duration),
    /// Dead on arrival; cleared by the next read
    Expired,
    /// Live until replaced
    Unbounded,
}

impl OverrideTtl {
    /// Reported TTL: zero for dead-on-arrival, none for unbounded
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            OverrideTtl::Window(window) => Some(*window),
            OverrideTtl::Expired => Some(Duration::ZERO),
            OverrideTtl::Unbounded => None,
        }
    }
}

/// Server-pushed thresholds. Written and cleared as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOverride {
    pub cooldown: Option<Duration>,
    pub session_gate: Option<Duration>,
    pub ttl: OverrideTtl,
    pub updated_at: MonotonicInstant,
}

impl ServerOverride {
    pub fn is_expired(&self, now: MonotonicInstant) -> bool {
        match self.ttl {
            OverrideTtl::Window(window) => now.duration_since(self.updated_at) > window,
            OverrideTtl::Expired => true,
            OverrideTtl::Unbounded => false,
        }
    }

    pub fn view(&self, now: MonotonicInstant) -> ServerOverrideView {
        ServerOverrideView {
            cooldown: self.cooldown,
            session_gate: self.session_gate,
            ttl: self.ttl.as_duration(),
            age: now.duration_since(self.updated_at),
        }
    }
}

/// Thresholds in force at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveThresholds {
    pub session_gate: Duration,
    pub session_gate_source: ThresholdSource,
    pub cooldown: Duration,
    pub cooldown_source: ThresholdSource,
    /// The override expired during this resolution
    pub expired: bool,
}

/// Holds local defaults and the optional server override
#[derive(Debug, Clone)]
pub struct PolicyStore {
    local_session_gate: Duration,
    local_cooldown: Duration,
    missing_ttl: MissingTtlPolicy,
    server: Option<ServerOverride>,
}

impl PolicyStore {
    pub fn new(policy: &GatingPolicy) -> Self {
        Self {
            local_session_gate: policy.session_gate,
            local_cooldown: policy.cooldown,
            missing_ttl: policy.missing_ttl,
            server: None,
        }
    }

    pub fn local_session_gate(&self) -> Duration {
        self.local_session_gate
    }

    pub fn local_cooldown(&self) -> Duration {
        self.local_cooldown
    }

    /// Current override, without checking expiry
    pub fn server_override(&self) -> Option<&ServerOverride> {
        self.server.as_ref()
    }

    /// Overwrite the server override. Values are seconds as sent by the
    /// server; negative thresholds count as absent.
    pub fn apply_server_restrictions(
        &mut self,
        cooldown_secs: Option<i64>,
        session_gate_secs: Option<i64>,
        ttl_secs: Option<i64>,
        now: MonotonicInstant,
    ) -> &ServerOverride {
        let ttl = match ttl_secs {
            Some(secs) if secs > 0 => OverrideTtl::Window(Duration::from_secs(secs.unsigned_abs())),
            Some(_) => OverrideTtl::Expired,
            None => match self.missing_ttl {
                MissingTtlPolicy::Expire => OverrideTtl::Expired,
                MissingTtlPolicy::Persist => OverrideTtl::Unbounded,
            },
        };

        let unit = ServerOverride {
            cooldown: non_negative_secs(cooldown_secs),
            session_gate: non_negative_secs(session_gate_secs),
            ttl,
            updated_at: now,
        };

        info!(
            cooldown = ?unit.cooldown,
            session_gate = ?unit.session_gate,
            ttl = ?unit.ttl,
            "Server restrictions applied"
        );

        self.server.insert(unit)
    }

    /// Drop the override if its TTL has run out. Returns true if it did.
    pub fn expire_if_stale(&mut self, now: MonotonicInstant) -> bool {
        if self.server.as_ref().is_some_and(|s| s.is_expired(now)) {
            self.server = None;
            debug!("Server restrictions expired, local thresholds apply");
            true
        } else {
            false
        }
    }

    /// Expire the override if stale, then resolve both thresholds
    pub fn resolve(&mut self, now: MonotonicInstant) -> EffectiveThresholds {
        let expired = self.expire_if_stale(now);

        let (session_gate, session_gate_source) = pick(
            self.server.as_ref().and_then(|s| s.session_gate),
            self.local_session_gate,
        );
        let (cooldown, cooldown_source) =
            pick(self.server.as_ref().and_then(|s| s.cooldown), self.local_cooldown);

        EffectiveThresholds {
            session_gate,
            session_gate_source,
            cooldown,
            cooldown_source,
            expired,
        }
    }
}

fn pick(server: Option<Duration>, local: Duration) -> (Duration, ThresholdSource) {
    match server {
        Some(value) => (value, ThresholdSource::Server),
        None => (local, ThresholdSource::Local),
    }
}

fn non_negative_secs(secs: Option<i64>) -> Option<Duration> {
    secs.and_then(|s| u64::try_from(s).ok()).map(Duration::from_secs)
}
