//! Presentation surface seam

use adgate_provider::{Impression, ProviderEvent, ProviderEventKind, ProviderEventSender, SlotContext};
use adgate_util::{AdError, RequestId};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

/// A server-approved ad, cached until presented
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    pub request_id: RequestId,
    pub final_url: String,
    pub track_url: Option<String>,
    pub fallback: bool,
}

impl Offer {
    pub fn impression(&self) -> Impression {
        Impression {
            request_id: self.request_id.clone(),
            track_url: self.track_url.clone(),
        }
    }
}

/// Reports what happened to one presentation, addressed to the slot that
/// asked for it
#[derive(Debug, Clone)]
pub struct PresentationReporter {
    context: SlotContext,
    impression: Impression,
    tx: ProviderEventSender,
}

impl PresentationReporter {
    pub fn new(context: SlotContext, impression: Impression, tx: ProviderEventSender) -> Self {
        Self {
            context,
            impression,
            tx,
        }
    }

    pub fn displayed(&self) {
        self.send(ProviderEventKind::Displayed {
            impression: Some(self.impression.clone()),
        });
    }

    pub fn hidden(&self) {
        self.send(ProviderEventKind::Hidden);
    }

    pub fn clicked(&self) {
        self.send(ProviderEventKind::Clicked);
    }

    pub fn failed(&self, error: AdError) {
        self.send(ProviderEventKind::DisplayFailed(error));
    }

    fn send(&self, kind: ProviderEventKind) {
        let _ = self.tx.send(ProviderEvent::new(&self.context, kind));
    }
}

/// Renders an offer. Must return promptly and report through `reporter`.
pub trait Presenter: Send + Sync {
    fn present(&self, offer: Offer, reporter: PresentationReporter);
}

/// Presenter for hosts without a rendering surface.
///
/// Logs the landing URL, reports the display straight away and the
/// dismissal after `dwell`.
#[derive(Debug, Clone)]
pub struct HeadlessPresenter {
    dwell: Duration,
    handle: Handle,
}

impl HeadlessPresenter {
    /// Must be called from within a tokio runtime
    pub fn new(dwell: Duration) -> Self {
        Self {
            dwell,
            handle: Handle::current(),
        }
    }
}

impl Presenter for HeadlessPresenter {
    fn present(&self, offer: Offer, reporter: PresentationReporter) {
        info!(
            request_id = %offer.request_id,
            final_url = %offer.final_url,
            fallback = offer.fallback,
            "Presenting ad"
        );
        reporter.displayed();

        let dwell = self.dwell;
        self.handle.spawn(async move {
            tokio::time::sleep(dwell).await;
            reporter.hidden();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adgate_provider::provider_channel;
    use adgate_util::PlacementId;

    #[tokio::test(start_paused = true)]
    async fn headless_presenter_displays_then_hides() {
        let (tx, mut rx) = provider_channel();
        let offer = Offer {
            request_id: RequestId::new("r1"),
            final_url: "https://example.com".into(),
            track_url: None,
            fallback: false,
        };
        let context = SlotContext::new(PlacementId::new("main"), 2);
        let reporter = PresentationReporter::new(context, offer.impression(), tx);

        HeadlessPresenter::new(Duration::from_secs(5)).present(offer, reporter);

        let displayed = rx.recv().await.unwrap();
        assert!(matches!(displayed.kind, ProviderEventKind::Displayed { impression: Some(_) }));
        assert_eq!(displayed.generation, 2);
        assert_eq!(rx.recv().await.unwrap().kind, ProviderEventKind::Hidden);
    }
}
