//! Test doubles for the provider and scheduler seams

use adgate_api::PolicyUpdate;
use adgate_util::{
    AdError, AdResult, AppId, Clock, MockClock, MonotonicInstant, PartnerId, PlacementId, RequestId,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{
    AdProvider, ImpressionTracker, PolicyFetcher, ProviderEvent, ProviderEventKind,
    ProviderEventSender, ScheduledTask, Scheduler, SlotContext,
};

/// Mock ad provider for unit/integration testing.
///
/// Records every call and never completes on its own. Tests either call the
/// controller's `on_*` handlers directly or use the `complete_*` helpers to
/// push completions through the event channel. Completions are tagged with
/// the context of the most recent `load` or `show` call.
#[derive(Debug)]
pub struct MockProvider {
    placement: PlacementId,
    event_tx: Option<ProviderEventSender>,
    last_context: Mutex<Option<SlotContext>>,
    load_calls: AtomicUsize,
    show_calls: AtomicUsize,
    destroyed: AtomicBool,

    /// What `is_ready()` reports
    pub ready: AtomicBool,

    /// Configure `show()` to leave the cached ad in place
    pub keep_ready_on_show: AtomicBool,
}

impl MockProvider {
    pub fn new(placement: PlacementId) -> Self {
        Self {
            placement,
            event_tx: None,
            last_context: Mutex::new(None),
            load_calls: AtomicUsize::new(0),
            show_calls: AtomicUsize::new(0),
            destroyed: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            keep_ready_on_show: AtomicBool::new(false),
        }
    }

    /// Route `complete_*` helpers through an event channel
    pub fn with_events(mut self, tx: ProviderEventSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn show_calls(&self) -> usize {
        self.show_calls.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Context of the most recent `load` or `show` call
    pub fn last_context(&self) -> Option<SlotContext> {
        self.lock_context().clone()
    }

    /// Simulate a successful load: cache the ad and report `Loaded`
    pub fn complete_load(&self) {
        self.set_ready(true);
        self.emit(ProviderEventKind::Loaded);
    }

    /// Simulate a failed load
    pub fn fail_load(&self, error: AdError) {
        self.set_ready(false);
        self.emit(ProviderEventKind::LoadFailed(error));
    }

    /// Simulate the ad appearing on screen
    pub fn complete_display(&self) {
        self.emit(ProviderEventKind::Displayed { impression: None });
    }

    /// Simulate the user dismissing the ad
    pub fn complete_hide(&self) {
        self.emit(ProviderEventKind::Hidden);
    }

    /// Simulate a presentation failure
    pub fn fail_display(&self, error: AdError) {
        self.emit(ProviderEventKind::DisplayFailed(error));
    }

    fn emit(&self, kind: ProviderEventKind) {
        let Some(tx) = &self.event_tx else {
            return;
        };
        let context = self
            .last_context()
            .unwrap_or_else(|| SlotContext::new(self.placement.clone(), 0));
        let _ = tx.send(ProviderEvent::new(&context, kind));
    }

    fn lock_context(&self) -> std::sync::MutexGuard<'_, Option<SlotContext>> {
        self.last_context.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AdProvider for MockProvider {
    fn load(&self, context: &SlotContext) {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        *self.lock_context() = Some(context.clone());
    }

    fn show(&self, context: &SlotContext) {
        self.show_calls.fetch_add(1, Ordering::SeqCst);
        *self.lock_context() = Some(context.clone());
        if !self.keep_ready_on_show.load(Ordering::SeqCst) {
            self.set_ready(false);
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

/// A task captured by [`ManualScheduler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTask {
    pub due: MonotonicInstant,
    pub delay: Duration,
    pub task: ScheduledTask,
}

/// Scheduler that holds tasks until the test releases them.
///
/// Due times are computed against a shared [`MockClock`], so a test
/// advances the clock and then collects whatever has come due.
#[derive(Debug, Clone)]
pub struct ManualScheduler {
    clock: MockClock,
    pending: Arc<Mutex<Vec<PendingTask>>>,
}

impl ManualScheduler {
    pub fn new(clock: MockClock) -> Self {
        Self {
            clock,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot of tasks not yet released, in scheduling order
    pub fn pending(&self) -> Vec<PendingTask> {
        self.lock().clone()
    }

    /// Delays of the tasks not yet released, in scheduling order
    pub fn pending_delays(&self) -> Vec<Duration> {
        self.lock().iter().map(|p| p.delay).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Remove and return every task due at the clock's current time,
    /// earliest first. Ties keep scheduling order.
    pub fn take_due(&self) -> Vec<ScheduledTask> {
        let now = self.clock.now();
        let mut pending = self.lock();
        let (mut due, rest): (Vec<_>, Vec<_>) = pending.drain(..).partition(|p| p.due <= now);
        *pending = rest;
        due.sort_by_key(|p| p.due);
        due.into_iter().map(|p| p.task).collect()
    }

    /// Advance the clock by `by` and return what came due
    pub fn advance(&self, by: Duration) -> Vec<ScheduledTask> {
        self.clock.advance(by);
        self.take_due()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PendingTask>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Scheduler for ManualScheduler {
    fn after(&self, delay: Duration, task: ScheduledTask) {
        let due = self.clock.now() + delay;
        self.lock().push(PendingTask { due, delay, task });
    }
}

/// Tracker that records impressions instead of sending them
#[derive(Debug, Clone, Default)]
pub struct RecordingTracker {
    tracked: Arc<Mutex<Vec<(RequestId, Option<String>)>>>,
}

impl RecordingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracked(&self) -> Vec<(RequestId, Option<String>)> {
        self.tracked.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ImpressionTracker for RecordingTracker {
    fn track_impression(&self, request_id: &RequestId, track_url: Option<&str>) {
        self.tracked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((request_id.clone(), track_url.map(str::to_string)));
    }
}

/// Fetcher that replays queued responses in order.
///
/// Once the queue is empty every fetch fails with `NetworkUnavailable`.
#[derive(Debug, Clone, Default)]
pub struct MockPolicyFetcher {
    responses: Arc<Mutex<VecDeque<AdResult<PolicyUpdate>>>>,
    requests: Arc<Mutex<Vec<(PartnerId, AppId, PlacementId)>>>,
}

impl MockPolicyFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: AdResult<PolicyUpdate>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    /// Every (partner, app, placement) fetched so far
    pub fn requests(&self) -> Vec<(PartnerId, AppId, PlacementId)> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl PolicyFetcher for MockPolicyFetcher {
    async fn fetch(
        &self,
        partner_id: &PartnerId,
        app_id: &AppId,
        placement: &PlacementId,
    ) -> AdResult<PolicyUpdate> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((partner_id.clone(), app_id.clone(), placement.clone()));

        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(AdError::network("no mock response queued")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{provider_channel, RetryAction};

    #[test]
    fn mock_provider_counts_calls() {
        let provider = MockProvider::new(PlacementId::new("main"));
        let ctx = SlotContext::new(PlacementId::new("main"), 1);

        provider.load(&ctx);
        provider.load(&ctx);
        provider.set_ready(true);
        provider.show(&ctx);

        assert_eq!(provider.load_calls(), 2);
        assert_eq!(provider.show_calls(), 1);
        // Presenting consumes the cached ad
        assert!(!provider.is_ready());
    }

    #[test]
    fn mock_provider_emits_completions() {
        let (tx, mut rx) = provider_channel();
        let provider = MockProvider::new(PlacementId::new("main")).with_events(tx);

        // Before any call the placement is used with generation 0
        provider.fail_load(AdError::NoFill);
        let first = rx.try_recv().unwrap();
        assert_eq!(first.kind, ProviderEventKind::LoadFailed(AdError::NoFill));
        assert_eq!(first.generation, 0);
        assert!(!provider.is_ready());

        provider.load(&SlotContext::new(PlacementId::new("main"), 4));
        provider.complete_load();
        assert!(provider.is_ready());

        provider.complete_display();
        provider.complete_hide();
        provider.fail_display(AdError::AdNotReady);

        let rest: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(rest.iter().all(|e| e.generation == 4));
        assert_eq!(
            rest.into_iter().map(|e| e.kind).collect::<Vec<_>>(),
            vec![
                ProviderEventKind::Loaded,
                ProviderEventKind::Displayed { impression: None },
                ProviderEventKind::Hidden,
                ProviderEventKind::DisplayFailed(AdError::AdNotReady),
            ]
        );
    }

    #[test]
    fn manual_scheduler_releases_in_due_order() {
        let clock = MockClock::new();
        let scheduler = ManualScheduler::new(clock.clone());
        let main = SlotContext::new(PlacementId::new("main"), 1);

        scheduler.after(
            Duration::from_secs(10),
            ScheduledTask::new(&main, RetryAction::Show),
        );
        scheduler.after(
            Duration::from_secs(2),
            ScheduledTask::new(&main, RetryAction::Load),
        );

        assert!(scheduler.advance(Duration::from_secs(1)).is_empty());
        assert_eq!(scheduler.pending()[0].task.action, RetryAction::Show);

        let due = scheduler.advance(Duration::from_secs(1));
        assert_eq!(due, vec![ScheduledTask::new(&main, RetryAction::Load)]);
        assert_eq!(scheduler.pending_delays(), vec![Duration::from_secs(10)]);

        let due = scheduler.advance(Duration::from_secs(30));
        assert_eq!(due, vec![ScheduledTask::new(&main, RetryAction::Show)]);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn mock_fetcher_replays_then_fails() {
        let fetcher = MockPolicyFetcher::new();
        fetcher.push_response(Ok(PolicyUpdate {
            allow: true,
            ..Default::default()
        }));

        let partner = PartnerId::new("p");
        let app = AppId::new("a");
        let main = PlacementId::new("main");

        assert!(fetcher.fetch(&partner, &app, &main).await.unwrap().allow);
        assert!(matches!(
            fetcher.fetch(&partner, &app, &main).await,
            Err(AdError::NetworkUnavailable(_))
        ));
        assert_eq!(fetcher.requests().len(), 2);
    }
}
