//! Provider and scheduler traits

use adgate_api::PolicyUpdate;
use adgate_util::{AdError, AdResult, AppId, PartnerId, PlacementId, RequestId};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// Identifies the slot controller a provider call was made for.
///
/// `generation` is assigned when the slot is registered. Replacing the slot
/// for a placement gives the new controller a new generation, so completions
/// and retries addressed to the old one can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotContext {
    pub placement: PlacementId,
    pub generation: u64,
}

impl SlotContext {
    pub fn new(placement: PlacementId, generation: u64) -> Self {
        Self {
            placement,
            generation,
        }
    }
}

/// Data needed to report an impression once an ad is on screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Impression {
    pub request_id: RequestId,
    pub track_url: Option<String>,
}

/// Completion notifications from a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEventKind {
    /// The server answered a policy request. Sent before the matching
    /// `Loaded` / `LoadFailed`.
    PolicyUpdated(PolicyUpdate),

    Loaded,

    LoadFailed(AdError),

    /// Ad is on screen
    Displayed { impression: Option<Impression> },

    /// Ad was dismissed
    Hidden,

    DisplayFailed(AdError),

    Clicked,
}

/// A provider notification tagged with the slot it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    pub placement: PlacementId,
    pub generation: u64,
    pub kind: ProviderEventKind,
}

impl ProviderEvent {
    /// Tag `kind` with the slot the originating call was made for
    pub fn new(context: &SlotContext, kind: ProviderEventKind) -> Self {
        Self {
            placement: context.placement.clone(),
            generation: context.generation,
            kind,
        }
    }
}

/// Channel providers use to report completions back to the service loop
pub type ProviderEventSender = mpsc::UnboundedSender<ProviderEvent>;
pub type ProviderEventReceiver = mpsc::UnboundedReceiver<ProviderEvent>;

/// Create the provider completion channel
pub fn provider_channel() -> (ProviderEventSender, ProviderEventReceiver) {
    mpsc::unbounded_channel()
}

/// Ad provider - loads and presents creatives for one placement.
///
/// `load` and `show` are fire-and-forget: they return immediately and
/// completion arrives later as a [`ProviderEvent`] built from the
/// [`SlotContext`] passed to the call. Implementations must not call back
/// into the orchestrator synchronously.
pub trait AdProvider: Send + Sync {
    /// Begin fetching an ad. Yields exactly one `Loaded` or `LoadFailed`.
    fn load(&self, context: &SlotContext);

    /// Present the cached ad. Yields `Displayed`, `Hidden`, `Clicked` or
    /// `DisplayFailed` as independent notifications.
    fn show(&self, context: &SlotContext);

    /// Whether an ad is cached and presentable right now
    fn is_ready(&self) -> bool;

    /// Optional: release provider-side resources when the slot is destroyed
    fn destroy(&self) {}
}

/// What to do when a scheduled retry fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryAction {
    /// Backoff retry after a load failure
    Load,
    /// Fixed-delay retry after the gate deferred a show
    Show,
    /// Fixed-delay recovery after a display failure
    RecoverDisplay,
}

/// A delayed retry addressed to one slot generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub placement: PlacementId,
    pub generation: u64,
    pub action: RetryAction,
}

impl ScheduledTask {
    pub fn new(context: &SlotContext, action: RetryAction) -> Self {
        Self {
            placement: context.placement.clone(),
            generation: context.generation,
            action,
        }
    }
}

/// Single-shot delayed delivery onto the orchestrator's execution context.
///
/// There is no cancellation: a task for a slot that has since been
/// destroyed or replaced is dropped when it fires.
pub trait Scheduler: Send + Sync {
    fn after(&self, delay: Duration, task: ScheduledTask);
}

/// Fetches the server policy for one placement.
///
/// A single attempt with a short timeout. Failures are returned to the
/// caller, which folds them into a load failure; the fetcher never retries.
#[async_trait]
pub trait PolicyFetcher: Send + Sync {
    async fn fetch(
        &self,
        partner_id: &PartnerId,
        app_id: &AppId,
        placement: &PlacementId,
    ) -> AdResult<PolicyUpdate>;
}

/// Best-effort impression reporting. No confirmation and no retry.
pub trait ImpressionTracker: Send + Sync {
    fn track_impression(&self, request_id: &RequestId, track_url: Option<&str>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn provider_channel_delivers_in_order() {
        let (tx, mut rx) = provider_channel();
        let context = SlotContext::new(PlacementId::new("main"), 3);

        tx.send(ProviderEvent::new(&context, ProviderEventKind::Loaded))
            .unwrap();
        tx.send(ProviderEvent::new(&context, ProviderEventKind::Clicked))
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, ProviderEventKind::Loaded);
        assert_eq!(first.generation, 3);
        assert_eq!(rx.recv().await.unwrap().kind, ProviderEventKind::Clicked);
    }
}
