//! Ad slot state machine

use adgate_api::{LoadOutcome, ShowOutcome, SlotState, SlotStatus};
use adgate_config::RetryPolicy;
use adgate_provider::{AdProvider, RetryAction, ScheduledTask, Scheduler, SlotContext};
use adgate_util::{AdError, MonotonicInstant, PlacementId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{CoreEvent, GateEngine};

/// Drives one ad slot through load, gate, present and refill.
///
/// The controller never blocks: provider calls are fire-and-forget and
/// completions come back through the `on_*` handlers. Retries go through
/// the scheduler and come back through [`AdSlotController::on_scheduled`].
/// Every provider call and scheduled task carries this controller's
/// [`SlotContext`].
pub struct AdSlotController {
    context: SlotContext,
    state: SlotState,
    retry_attempt: u32,
    alive: bool,
    show_retry_pending: bool,
    display_recorded: bool,
    provider: Option<Arc<dyn AdProvider>>,
    scheduler: Arc<dyn Scheduler>,
    retry: RetryPolicy,
    events: Vec<CoreEvent>,
}

impl AdSlotController {
    pub fn new(
        context: SlotContext,
        provider: Arc<dyn AdProvider>,
        scheduler: Arc<dyn Scheduler>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            context,
            state: SlotState::Idle,
            retry_attempt: 0,
            alive: true,
            show_retry_pending: false,
            display_recorded: false,
            provider: Some(provider),
            scheduler,
            retry,
            events: Vec::new(),
        }
    }

    pub fn placement(&self) -> &PlacementId {
        &self.context.placement
    }

    pub fn context(&self) -> &SlotContext {
        &self.context
    }

    pub fn generation(&self) -> u64 {
        self.context.generation
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Consecutive load failures since the last success
    pub fn retry_attempt(&self) -> u32 {
        self.retry_attempt
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Whether the provider has something presentable
    pub fn is_ready(&self) -> bool {
        self.live_provider().is_some_and(|p| p.is_ready())
    }

    pub fn status(&self) -> SlotStatus {
        SlotStatus {
            placement: self.context.placement.clone(),
            state: self.state,
            retry_attempt: self.retry_attempt,
            ready: self.is_ready(),
            alive: self.alive,
        }
    }

    /// Request an ad. At most one load is outstanding per slot.
    pub fn load(&mut self) -> LoadOutcome {
        let Some(provider) = self.live_provider() else {
            return LoadOutcome::NotInitialized;
        };

        match self.state {
            SlotState::Loading => {
                debug!(placement = %self.context.placement, "Load already in flight");
                LoadOutcome::AlreadyLoading
            }
            SlotState::Showing => {
                debug!(placement = %self.context.placement, "Slot is presenting; refill happens on hide");
                LoadOutcome::Showing
            }
            SlotState::Idle | SlotState::Ready | SlotState::FailedLoad | SlotState::FailedShow => {
                self.transition(SlotState::Loading);
                provider.load(&self.context);
                LoadOutcome::Started
            }
        }
    }

    /// Present the cached ad if the gate allows it.
    ///
    /// A closed gate defers: a single show retry is queued and the state is
    /// left alone.
    pub fn show(&mut self, gate: &mut GateEngine, now: MonotonicInstant) -> ShowOutcome {
        let Some(provider) = self.live_provider() else {
            return ShowOutcome::NotInitialized;
        };

        if self.state == SlotState::Showing {
            debug!(placement = %self.context.placement, "Show ignored, already presenting");
            return ShowOutcome::AlreadyShowing;
        }

        let decision = gate.evaluate(now);
        if !decision.allowed {
            let retry_in = self.retry.show_retry_delay;
            if self.show_retry_pending {
                debug!(placement = %self.context.placement, "Show deferred, retry already queued");
            } else {
                info!(
                    placement = %self.context.placement,
                    reason = ?decision.reason,
                    retry_secs = retry_in.as_secs(),
                    "Show deferred by gate"
                );
                self.show_retry_pending = true;
                self.scheduler
                    .after(retry_in, ScheduledTask::new(&self.context, RetryAction::Show));
            }
            self.events.push(CoreEvent::ShowDeferred {
                placement: self.context.placement.clone(),
                reason: decision.reason,
                retry_in,
            });
            return ShowOutcome::Deferred {
                reason: decision.reason,
                retry_in,
            };
        }

        if self.state == SlotState::Loading || !provider.is_ready() {
            info!(placement = %self.context.placement, state = %self.state, "Ad not ready, reloading");
            self.load();
            return ShowOutcome::NotReady;
        }

        self.display_recorded = false;
        self.transition(SlotState::Showing);
        provider.show(&self.context);
        ShowOutcome::Presenting
    }

    /// Returns true if the completion was accepted
    pub fn on_load_success(&mut self) -> bool {
        if !self.accepts("load success", SlotState::Loading) {
            return false;
        }

        if self.retry_attempt > 0 {
            info!(
                placement = %self.context.placement,
                after_failures = self.retry_attempt,
                "Ad loaded after retries"
            );
        } else {
            info!(placement = %self.context.placement, "Ad loaded");
        }

        self.retry_attempt = 0;
        self.transition(SlotState::Ready);
        self.events.push(CoreEvent::AdLoaded {
            placement: self.context.placement.clone(),
        });
        true
    }

    pub fn on_load_failure(&mut self, error: AdError) {
        if !self.accepts("load failure", SlotState::Loading) {
            return;
        }

        self.retry_attempt = self.retry_attempt.saturating_add(1);
        let retry_in = self.retry.backoff.delay_for(self.retry_attempt);

        warn!(
            placement = %self.context.placement,
            error = %error,
            attempt = self.retry_attempt,
            retry_secs = retry_in.as_secs(),
            "Ad load failed, scheduling retry"
        );

        self.transition(SlotState::FailedLoad);
        self.scheduler
            .after(retry_in, ScheduledTask::new(&self.context, RetryAction::Load));
        self.events.push(CoreEvent::AdLoadFailed {
            placement: self.context.placement.clone(),
            error,
            attempt: self.retry_attempt,
            retry_in,
        });
    }

    /// Record the show time on the first display notification of a
    /// presentation. Returns true only for that first notification.
    pub fn on_displayed(&mut self, gate: &mut GateEngine, now: MonotonicInstant) -> bool {
        if !self.accepts("display", SlotState::Showing) {
            return false;
        }
        if self.display_recorded {
            debug!(placement = %self.context.placement, "Duplicate display notification");
            return false;
        }

        info!(placement = %self.context.placement, "Ad displayed");
        self.display_recorded = true;
        gate.record_show(now);
        self.events.push(CoreEvent::AdDisplayed {
            placement: self.context.placement.clone(),
        });
        true
    }

    /// Ad dismissed: go idle and immediately refill
    pub fn on_hidden(&mut self) {
        if !self.accepts("hide", SlotState::Showing) {
            return;
        }

        info!(placement = %self.context.placement, "Ad hidden, refilling slot");
        self.events.push(CoreEvent::AdHidden {
            placement: self.context.placement.clone(),
        });
        self.transition(SlotState::Idle);
        self.load();
    }

    pub fn on_display_failure(&mut self, error: AdError) {
        if !self.accepts("display failure", SlotState::Showing) {
            return;
        }

        let retry_in = self.retry.display_failure_retry_delay;
        warn!(
            placement = %self.context.placement,
            error = %error,
            retry_secs = retry_in.as_secs(),
            "Ad failed to display, scheduling recovery"
        );

        self.transition(SlotState::FailedShow);
        self.scheduler
            .after(retry_in, ScheduledTask::new(&self.context, RetryAction::RecoverDisplay));
        self.events.push(CoreEvent::AdDisplayFailed {
            placement: self.context.placement.clone(),
            error,
            retry_in,
        });
    }

    /// Pass-through notification
    pub fn on_clicked(&mut self) {
        if !self.alive {
            return;
        }
        debug!(placement = %self.context.placement, "Ad clicked");
        self.events.push(CoreEvent::AdClicked {
            placement: self.context.placement.clone(),
        });
    }

    /// A scheduled retry fired
    pub fn on_scheduled(&mut self, action: RetryAction, gate: &mut GateEngine, now: MonotonicInstant) {
        if !self.alive {
            debug!(placement = %self.context.placement, ?action, "Dropping retry for destroyed slot");
            return;
        }

        match action {
            RetryAction::Load => {
                if self.state == SlotState::FailedLoad {
                    self.load();
                } else {
                    debug!(placement = %self.context.placement, state = %self.state, "Load retry no longer needed");
                }
            }
            RetryAction::Show => {
                self.show_retry_pending = false;
                self.show(gate, now);
            }
            RetryAction::RecoverDisplay => {
                if self.state != SlotState::FailedShow {
                    debug!(placement = %self.context.placement, state = %self.state, "Display recovery no longer needed");
                } else if self.is_ready() {
                    self.show(gate, now);
                } else {
                    self.load();
                }
            }
        }
    }

    /// Sever the provider and mark the slot dead. Later completions and
    /// fired retries are ignored.
    pub fn destroy(&mut self) {
        if let Some(provider) = self.provider.take() {
            provider.destroy();
        }
        if self.alive {
            info!(placement = %self.context.placement, "Slot destroyed");
        }
        self.alive = false;
    }

    pub fn take_events(&mut self) -> Vec<CoreEvent> {
        std::mem::take(&mut self.events)
    }

    fn live_provider(&self) -> Option<Arc<dyn AdProvider>> {
        if self.alive { self.provider.clone() } else { None }
    }

    fn accepts(&self, what: &str, expected: SlotState) -> bool {
        if !self.alive {
            debug!(placement = %self.context.placement, what, "Ignoring completion for destroyed slot");
            return false;
        }
        if self.state != expected {
            debug!(
                placement = %self.context.placement,
                what,
                state = %self.state,
                "Ignoring out-of-state completion"
            );
            return false;
        }
        true
    }

    fn transition(&mut self, to: SlotState) {
        let from = self.state;
        if from == to {
            return;
        }
        debug!(placement = %self.context.placement, %from, %to, "Slot state change");
        self.state = to;
        self.events.push(CoreEvent::SlotStateChanged {
            placement: self.context.placement.clone(),
            from,
            to,
        });
    }
}

impl std::fmt::Debug for AdSlotController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdSlotController")
            .field("context", &self.context)
            .field("state", &self.state)
            .field("retry_attempt", &self.retry_attempt)
            .field("alive", &self.alive)
            .field("show_retry_pending", &self.show_retry_pending)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PolicyStore;
    use adgate_api::GateReason;
    use adgate_config::GatingPolicy;
    use adgate_provider::{ManualScheduler, MockProvider};
    use adgate_util::{Clock, MockClock};
    use std::time::Duration;

    struct Harness {
        clock: MockClock,
        scheduler: ManualScheduler,
        provider: Arc<MockProvider>,
        gate: GateEngine,
        slot: AdSlotController,
    }

    impl Harness {
        fn new() -> Self {
            let clock = MockClock::new();
            let scheduler = ManualScheduler::new(clock.clone());
            let provider = Arc::new(MockProvider::new(PlacementId::new("main")));
            let gate = GateEngine::new(PolicyStore::new(&GatingPolicy::default()), clock.now());
            let slot = AdSlotController::new(
                SlotContext::new(PlacementId::new("main"), 1),
                provider.clone(),
                Arc::new(scheduler.clone()),
                RetryPolicy::default(),
            );
            Self {
                clock,
                scheduler,
                provider,
                gate,
                slot,
            }
        }

        /// Move past the session gate
        fn open_gate(&self) {
            self.clock.set_elapsed(Duration::from_secs(60));
        }

        fn make_ready(&mut self) {
            self.slot.load();
            self.provider.set_ready(true);
            assert!(self.slot.on_load_success());
        }

        fn show(&mut self) -> ShowOutcome {
            self.slot.show(&mut self.gate, self.clock.now())
        }

        /// Advance time and deliver whatever came due
        fn advance(&mut self, by: Duration) {
            for task in self.scheduler.advance(by) {
                self.slot.on_scheduled(task.action, &mut self.gate, self.clock.now());
            }
        }
    }

    #[test]
    fn load_while_loading_is_noop() {
        let mut h = Harness::new();

        assert_eq!(h.slot.load(), LoadOutcome::Started);
        assert_eq!(h.slot.load(), LoadOutcome::AlreadyLoading);
        assert_eq!(h.slot.load(), LoadOutcome::AlreadyLoading);

        assert_eq!(h.provider.load_calls(), 1);
        assert_eq!(h.slot.state(), SlotState::Loading);
    }

    #[test]
    fn calls_and_retries_carry_slot_context() {
        let mut h = Harness::new();

        h.slot.load();
        assert_eq!(h.provider.last_context(), Some(h.slot.context().clone()));

        h.slot.on_load_failure(AdError::NoFill);
        let pending = h.scheduler.pending();
        assert_eq!(pending[0].task.placement, *h.slot.placement());
        assert_eq!(pending[0].task.generation, h.slot.generation());
    }

    #[test]
    fn three_failures_then_success() {
        let mut h = Harness::new();
        h.slot.load();

        for (attempt, delay) in [(1, 2), (2, 4), (3, 8)] {
            h.slot.on_load_failure(AdError::NoFill);
            assert_eq!(h.slot.state(), SlotState::FailedLoad);
            assert_eq!(h.slot.retry_attempt(), attempt);
            assert_eq!(h.scheduler.pending_delays(), vec![Duration::from_secs(delay)]);

            h.advance(Duration::from_secs(delay));
            assert_eq!(h.slot.state(), SlotState::Loading);
        }

        assert_eq!(h.provider.load_calls(), 4);

        assert!(h.slot.on_load_success());
        assert_eq!(h.slot.retry_attempt(), 0);
        assert_eq!(h.slot.state(), SlotState::Ready);
    }

    #[test]
    fn backoff_plateaus() {
        let mut h = Harness::new();
        h.slot.load();

        let mut delays = Vec::new();
        for _ in 0..8 {
            h.slot.on_load_failure(AdError::network("offline"));
            let pending = h.scheduler.pending_delays();
            delays.push(pending[0].as_secs());
            h.advance(pending[0]);
        }

        assert_eq!(delays, vec![2, 4, 8, 16, 32, 64, 64, 64]);
        assert_eq!(h.slot.retry_attempt(), 8);
    }

    #[test]
    fn gated_show_defers_without_state_change() {
        let mut h = Harness::new();
        h.make_ready();

        let outcome = h.show();
        assert_eq!(
            outcome,
            ShowOutcome::Deferred {
                reason: GateReason::SessionGate,
                retry_in: Duration::from_secs(10),
            }
        );
        assert_eq!(h.slot.state(), SlotState::Ready);
        assert_eq!(h.slot.retry_attempt(), 0);
        assert_eq!(h.scheduler.pending_delays(), vec![Duration::from_secs(10)]);
        assert_eq!(h.provider.show_calls(), 0);
    }

    #[test]
    fn deferred_show_retries_are_not_stacked() {
        let mut h = Harness::new();
        h.make_ready();

        h.show();
        h.show();
        h.show();
        assert_eq!(h.scheduler.pending_count(), 1);

        // Still gated at T+10: the fired retry queues exactly one more
        h.advance(Duration::from_secs(10));
        assert_eq!(h.scheduler.pending_count(), 1);

        // T+30: the retry presents
        h.advance(Duration::from_secs(20));
        assert_eq!(h.slot.state(), SlotState::Showing);
        assert_eq!(h.provider.show_calls(), 1);
    }

    #[test]
    fn show_when_not_ready_reloads() {
        let mut h = Harness::new();
        h.open_gate();
        h.make_ready();
        h.provider.set_ready(false);

        assert_eq!(h.show(), ShowOutcome::NotReady);
        assert_eq!(h.slot.state(), SlotState::Loading);
        assert_eq!(h.provider.load_calls(), 2);
    }

    #[test]
    fn display_records_show_once() {
        let mut h = Harness::new();
        h.open_gate();
        h.make_ready();

        assert_eq!(h.show(), ShowOutcome::Presenting);
        // Show time is not recorded until display is confirmed
        assert_eq!(h.gate.last_show(), None);

        h.clock.advance(Duration::from_secs(1));
        let displayed_at = h.clock.now();
        assert!(h.slot.on_displayed(&mut h.gate, displayed_at));

        h.clock.advance(Duration::from_secs(1));
        assert!(!h.slot.on_displayed(&mut h.gate, h.clock.now()));
        assert_eq!(h.gate.last_show(), Some(displayed_at));
        assert_eq!(h.slot.state(), SlotState::Showing);
    }

    #[test]
    fn hidden_refills_slot() {
        let mut h = Harness::new();
        h.open_gate();
        h.make_ready();
        h.show();

        assert_eq!(h.slot.load(), LoadOutcome::Showing);

        h.slot.take_events();
        h.slot.on_hidden();
        assert_eq!(h.slot.state(), SlotState::Loading);
        assert_eq!(h.provider.load_calls(), 2);

        let states: Vec<_> = h
            .slot
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                CoreEvent::SlotStateChanged { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                (SlotState::Showing, SlotState::Idle),
                (SlotState::Idle, SlotState::Loading)
            ]
        );
    }

    #[test]
    fn display_failure_recovers_by_showing_if_ready() {
        let mut h = Harness::new();
        h.open_gate();
        h.make_ready();
        h.provider.keep_ready_on_show.store(true, std::sync::atomic::Ordering::SeqCst);
        h.show();

        h.slot.on_display_failure(AdError::AdNotReady);
        assert_eq!(h.slot.state(), SlotState::FailedShow);
        assert_eq!(h.scheduler.pending_delays(), vec![Duration::from_secs(10)]);

        h.advance(Duration::from_secs(10));
        assert_eq!(h.slot.state(), SlotState::Showing);
        assert_eq!(h.provider.show_calls(), 2);
    }

    #[test]
    fn display_failure_recovers_by_loading_if_not_ready() {
        let mut h = Harness::new();
        h.open_gate();
        h.make_ready();
        h.show();

        h.slot.on_display_failure(AdError::unspecified("surface gone"));
        h.advance(Duration::from_secs(10));

        assert_eq!(h.slot.state(), SlotState::Loading);
        assert_eq!(h.provider.show_calls(), 1);
        assert_eq!(h.provider.load_calls(), 2);
    }

    #[test]
    fn out_of_state_completions_are_ignored() {
        let mut h = Harness::new();

        assert!(!h.slot.on_load_success());
        h.slot.on_load_failure(AdError::NoFill);
        h.slot.on_hidden();

        assert_eq!(h.slot.state(), SlotState::Idle);
        assert_eq!(h.slot.retry_attempt(), 0);
        assert_eq!(h.scheduler.pending_count(), 0);
    }

    #[test]
    fn destroyed_slot_ignores_late_events() {
        let mut h = Harness::new();
        h.slot.load();
        h.slot.on_load_failure(AdError::NoFill);

        h.slot.destroy();
        assert!(h.provider.is_destroyed());

        h.advance(Duration::from_secs(2));
        assert_eq!(h.provider.load_calls(), 1);
        assert!(!h.slot.on_load_success());
        assert_eq!(h.slot.load(), LoadOutcome::NotInitialized);
        assert_eq!(h.show(), ShowOutcome::NotInitialized);
        assert!(!h.slot.status().alive);
    }
}
