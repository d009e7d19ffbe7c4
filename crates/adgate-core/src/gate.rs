//! Gate evaluation

use adgate_api::{GateDecision, GateReason, ServerOverrideView};
use adgate_util::MonotonicInstant;
use tracing::{debug, trace};

use crate::{CoreEvent, PolicyStore};

/// Decides whether a presentation is permitted at a given instant.
///
/// Owns the threshold store and the session timestamps. Reads may expire a
/// stale server override, which is why evaluation takes `&mut self`.
#[derive(Debug)]
pub struct GateEngine {
    store: PolicyStore,
    session_start: MonotonicInstant,
    last_show: Option<MonotonicInstant>,
    events: Vec<CoreEvent>,
}

impl GateEngine {
    pub fn new(store: PolicyStore, session_start: MonotonicInstant) -> Self {
        Self {
            store,
            session_start,
            last_show: None,
            events: Vec::new(),
        }
    }

    pub fn session_start(&self) -> MonotonicInstant {
        self.session_start
    }

    pub fn last_show(&self) -> Option<MonotonicInstant> {
        self.last_show
    }

    pub fn store(&self) -> &PolicyStore {
        &self.store
    }

    /// Evaluate the gate at `now`
    pub fn evaluate(&mut self, now: MonotonicInstant) -> GateDecision {
        let thresholds = self.store.resolve(now);
        if thresholds.expired {
            self.events.push(CoreEvent::ServerRestrictionsExpired);
        }

        let mut decision = GateDecision {
            allowed: true,
            reason: GateReason::Allowed,
            effective_session_gate: thresholds.session_gate,
            session_gate_source: thresholds.session_gate_source,
            effective_cooldown: thresholds.cooldown,
            cooldown_source: thresholds.cooldown_source,
        };

        let since_start = now.duration_since(self.session_start);
        if since_start < thresholds.session_gate {
            debug!(
                elapsed_secs = since_start.as_secs_f64(),
                gate_secs = thresholds.session_gate.as_secs(),
                source = ?thresholds.session_gate_source,
                "Gate closed: session gate"
            );
            decision.allowed = false;
            decision.reason = GateReason::SessionGate;
            return decision;
        }

        if let Some(last_show) = self.last_show {
            let since_show = now.duration_since(last_show);
            if since_show < thresholds.cooldown {
                debug!(
                    elapsed_secs = since_show.as_secs_f64(),
                    cooldown_secs = thresholds.cooldown.as_secs(),
                    source = ?thresholds.cooldown_source,
                    "Gate closed: cooldown"
                );
                decision.allowed = false;
                decision.reason = GateReason::Cooldown;
                return decision;
            }
        }

        trace!("Gate open");
        decision
    }

    pub fn can_show(&mut self, now: MonotonicInstant) -> bool {
        self.evaluate(now).allowed
    }

    /// Record a confirmed presentation; starts the cooldown
    pub fn record_show(&mut self, now: MonotonicInstant) {
        debug!("Recording show time");
        self.last_show = Some(now);
    }

    /// Overwrite the server override unit
    pub fn apply_server_restrictions(
        &mut self,
        cooldown_secs: Option<i64>,
        session_gate_secs: Option<i64>,
        ttl_secs: Option<i64>,
        now: MonotonicInstant,
    ) {
        let unit = self
            .store
            .apply_server_restrictions(cooldown_secs, session_gate_secs, ttl_secs, now);

        self.events.push(CoreEvent::ServerRestrictionsUpdated {
            cooldown: unit.cooldown,
            session_gate: unit.session_gate,
            ttl: unit.ttl.as_duration(),
        });
    }

    /// Live override as of `now`, expiring it first if stale
    pub fn server_override(&mut self, now: MonotonicInstant) -> Option<ServerOverrideView> {
        if self.store.expire_if_stale(now) {
            self.events.push(CoreEvent::ServerRestrictionsExpired);
        }
        self.store.server_override().map(|s| s.view(now))
    }

    pub fn take_events(&mut self) -> Vec<CoreEvent> {
        std::mem::take(&mut self.events)
    }
}
