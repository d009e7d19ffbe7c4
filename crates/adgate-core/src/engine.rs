//! Caller-facing facade over the gate and slot controllers

use adgate_api::{GateDecision, LoadOutcome, ServiceStateSnapshot, ShowOutcome, API_VERSION};
use adgate_config::Settings;
use adgate_provider::{
    AdProvider, ImpressionTracker, ProviderEvent, ProviderEventKind, ScheduledTask, Scheduler,
    SlotContext,
};
use adgate_util::{AppId, Clock, PartnerId, PlacementId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{AdSlotController, CoreEvent, GateEngine, PolicyStore};

/// Identity recorded by `initialize`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub partner_id: PartnerId,
    pub app_id: AppId,
    /// Overrides the configured policy endpoint
    pub base_url: Option<String>,
}

/// Callback invoked when a slot finishes loading
pub type AdLoadedCallback = Box<dyn FnMut(&PlacementId) + Send>;

/// The ad gating service.
///
/// Owns the gate and one controller per placement. All methods must be
/// called from the same logical context; asynchronous completions come in
/// through [`AdGate::handle_provider_event`] and
/// [`AdGate::handle_scheduled`].
pub struct AdGate {
    settings: Settings,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    tracker: Option<Arc<dyn ImpressionTracker>>,
    identity: Option<Identity>,
    gate: GateEngine,
    slots: HashMap<PlacementId, AdSlotController>,
    /// Last generation handed to a registered slot
    next_generation: u64,
    on_ad_loaded: Option<AdLoadedCallback>,
    events: Vec<CoreEvent>,
}

impl AdGate {
    /// Create the service. The session starts now.
    pub fn new(settings: Settings, clock: Arc<dyn Clock>, scheduler: Arc<dyn Scheduler>) -> Self {
        let gate = GateEngine::new(PolicyStore::new(&settings.gating), clock.now());

        info!(
            session_gate_secs = settings.gating.session_gate.as_secs(),
            cooldown_secs = settings.gating.cooldown.as_secs(),
            "Ad gate created"
        );

        let mut ad_gate = Self {
            settings,
            clock,
            scheduler,
            tracker: None,
            identity: None,
            gate,
            slots: HashMap::new(),
            next_generation: 0,
            on_ad_loaded: None,
            events: Vec::new(),
        };

        if let (Some(partner_id), Some(app_id)) = (
            ad_gate.settings.service.partner_id.clone(),
            ad_gate.settings.service.app_id.clone(),
        ) {
            ad_gate.initialize(partner_id, app_id, None);
        }

        ad_gate
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn ImpressionTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.identity.is_some()
    }

    /// Record the partner/app identity. Calling again replaces it.
    pub fn initialize(&mut self, partner_id: PartnerId, app_id: AppId, base_url: Option<String>) {
        if let Some(previous) = &self.identity {
            info!(
                previous_partner = %previous.partner_id,
                previous_app = %previous.app_id,
                "Re-initializing"
            );
        }
        info!(partner_id = %partner_id, app_id = %app_id, ?base_url, "Initialized");
        self.identity = Some(Identity {
            partner_id,
            app_id,
            base_url,
        });
    }

    pub fn set_on_ad_loaded(&mut self, callback: AdLoadedCallback) {
        self.on_ad_loaded = Some(callback);
    }

    /// Full gate evaluation at the current time
    pub fn evaluate(&mut self) -> GateDecision {
        let now = self.clock.now();
        let decision = self.gate.evaluate(now);
        self.collect(None);
        decision
    }

    pub fn can_show_ad(&mut self) -> bool {
        self.evaluate().allowed
    }

    /// Record that an ad was shown outside of a slot controller
    pub fn did_show_ad(&mut self) {
        let now = self.clock.now();
        self.gate.record_show(now);
    }

    /// Values are seconds as sent by the server
    pub fn update_server_restrictions(
        &mut self,
        cooldown_secs: Option<i64>,
        session_gate_secs: Option<i64>,
        ttl_secs: Option<i64>,
    ) {
        let now = self.clock.now();
        self.gate
            .apply_server_restrictions(cooldown_secs, session_gate_secs, ttl_secs, now);
        self.collect(None);
    }

    /// Attach a provider to a placement. An existing slot for the same
    /// placement is destroyed, and anything still addressed to it is
    /// dropped on arrival.
    pub fn register_slot(&mut self, placement: PlacementId, provider: Arc<dyn AdProvider>) {
        self.next_generation += 1;
        let slot = AdSlotController::new(
            SlotContext::new(placement.clone(), self.next_generation),
            provider,
            self.scheduler.clone(),
            self.settings.retry.clone(),
        );

        if let Some(mut previous) = self.slots.insert(placement.clone(), slot) {
            warn!(
                placement = %placement,
                previous_generation = previous.generation(),
                generation = self.next_generation,
                "Replacing existing slot"
            );
            previous.destroy();
        } else {
            debug!(placement = %placement, generation = self.next_generation, "Slot registered");
        }
    }

    pub fn has_slot(&self, placement: &PlacementId) -> bool {
        self.slots.contains_key(placement)
    }

    pub fn placements(&self) -> Vec<PlacementId> {
        let mut placements: Vec<_> = self.slots.keys().cloned().collect();
        placements.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        placements
    }

    pub fn load(&mut self, placement: &PlacementId) -> LoadOutcome {
        if !self.is_initialized() {
            debug!(placement = %placement, "Load before initialize");
            return LoadOutcome::NotInitialized;
        }
        let Some(slot) = self.slots.get_mut(placement) else {
            debug!(placement = %placement, "Load for unknown placement");
            return LoadOutcome::NotInitialized;
        };

        let outcome = slot.load();
        self.collect(Some(placement));
        outcome
    }

    pub fn show(&mut self, placement: &PlacementId) -> ShowOutcome {
        if !self.is_initialized() {
            debug!(placement = %placement, "Show before initialize");
            return ShowOutcome::NotInitialized;
        }
        let now = self.clock.now();
        let Some(slot) = self.slots.get_mut(placement) else {
            debug!(placement = %placement, "Show for unknown placement");
            return ShowOutcome::NotInitialized;
        };

        let outcome = slot.show(&mut self.gate, now);
        self.collect(Some(placement));
        outcome
    }

    pub fn is_ready(&self, placement: &PlacementId) -> bool {
        self.is_initialized() && self.slots.get(placement).is_some_and(|s| s.is_ready())
    }

    /// Returns false if there was no such slot
    pub fn destroy_slot(&mut self, placement: &PlacementId) -> bool {
        match self.slots.get_mut(placement) {
            Some(slot) => {
                slot.destroy();
                true
            }
            None => false,
        }
    }

    /// Destroy every slot
    pub fn shutdown(&mut self) {
        info!(slots = self.slots.len(), "Shutting down ad gate");
        for slot in self.slots.values_mut() {
            slot.destroy();
        }
    }

    /// Re-entry point for provider completions
    pub fn handle_provider_event(&mut self, event: ProviderEvent) {
        let ProviderEvent {
            placement,
            generation,
            kind,
        } = event;
        let now = self.clock.now();

        let Some(slot) = self.slots.get_mut(&placement) else {
            debug!(placement = %placement, ?kind, "Event for unknown placement");
            return;
        };
        if slot.generation() != generation {
            debug!(
                placement = %placement,
                generation,
                current = slot.generation(),
                ?kind,
                "Event for replaced slot"
            );
            return;
        }
        if !slot.is_alive() {
            debug!(placement = %placement, ?kind, "Event for destroyed slot");
            return;
        }

        match kind {
            ProviderEventKind::PolicyUpdated(update) => {
                debug!(
                    placement = %placement,
                    allow = update.allow,
                    request_id = ?update.request_id,
                    "Policy update received"
                );
                self.gate.apply_server_restrictions(
                    update.cooldown_sec,
                    update.session_gate,
                    update.ttl,
                    now,
                );
            }
            ProviderEventKind::Loaded => {
                if slot.on_load_success()
                    && let Some(callback) = self.on_ad_loaded.as_mut()
                {
                    callback(&placement);
                }
            }
            ProviderEventKind::LoadFailed(error) => slot.on_load_failure(error),
            ProviderEventKind::Displayed { impression } => {
                if slot.on_displayed(&mut self.gate, now)
                    && let Some(impression) = impression
                {
                    match &self.tracker {
                        Some(tracker) => tracker
                            .track_impression(&impression.request_id, impression.track_url.as_deref()),
                        None => debug!(placement = %placement, "No impression tracker configured"),
                    }
                }
            }
            ProviderEventKind::Hidden => slot.on_hidden(),
            ProviderEventKind::DisplayFailed(error) => slot.on_display_failure(error),
            ProviderEventKind::Clicked => slot.on_clicked(),
        }

        self.collect(Some(&placement));
    }

    /// Re-entry point for fired retries
    pub fn handle_scheduled(&mut self, task: ScheduledTask) {
        let now = self.clock.now();
        let Some(slot) = self.slots.get_mut(&task.placement) else {
            debug!(placement = %task.placement, action = ?task.action, "Retry for unknown placement");
            return;
        };
        if slot.generation() != task.generation {
            debug!(
                placement = %task.placement,
                generation = task.generation,
                current = slot.generation(),
                action = ?task.action,
                "Retry for replaced slot"
            );
            return;
        }

        slot.on_scheduled(task.action, &mut self.gate, now);
        self.collect(Some(&task.placement));
    }

    /// Take the events produced since the last drain, in order
    pub fn drain_events(&mut self) -> Vec<CoreEvent> {
        self.collect(None);
        std::mem::take(&mut self.events)
    }

    pub fn get_state(&mut self) -> ServiceStateSnapshot {
        let now = self.clock.now();
        let gate = self.gate.evaluate(now);
        let server_override = self.gate.server_override(now);
        self.collect(None);

        let mut slots: Vec<_> = self.slots.values().map(|s| s.status()).collect();
        slots.sort_by(|a, b| a.placement.as_str().cmp(b.placement.as_str()));

        ServiceStateSnapshot {
            api_version: API_VERSION,
            initialized: self.is_initialized(),
            gate,
            server_override,
            since_session_start: now.duration_since(self.gate.session_start()),
            since_last_show: self.gate.last_show().map(|t| now.duration_since(t)),
            slots,
        }
    }

    /// Move gate events, then the slot's, onto the outgoing queue
    fn collect(&mut self, placement: Option<&PlacementId>) {
        self.events.extend(self.gate.take_events());
        if let Some(slot) = placement.and_then(|p| self.slots.get_mut(p)) {
            self.events.extend(slot.take_events());
        }
    }
}

impl std::fmt::Debug for AdGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdGate")
            .field("identity", &self.identity)
            .field("gate", &self.gate)
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}
