//! Ad provider backed by the policy server

use adgate_provider::{
    AdProvider, PolicyFetcher, ProviderEvent, ProviderEventKind, ProviderEventSender, SlotContext,
};
use adgate_util::{AdError, AppId, PartnerId, PlacementId, RequestId};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::{Offer, PresentationReporter, Presenter};

/// Loads by asking the policy server for an offer and presents it through a
/// [`Presenter`].
///
/// Every successful fetch is reported as `PolicyUpdated` before the load
/// result, so server restrictions reach the gate even when the server
/// declines. Completions carry the context of the call that started them.
pub struct FetchingProvider {
    placement: PlacementId,
    partner_id: PartnerId,
    app_id: AppId,
    fetcher: Arc<dyn PolicyFetcher>,
    presenter: Arc<dyn Presenter>,
    tx: ProviderEventSender,
    offer: Arc<Mutex<Option<Offer>>>,
    handle: Handle,
}

impl FetchingProvider {
    /// Must be called from within a tokio runtime
    pub fn new(
        placement: PlacementId,
        partner_id: PartnerId,
        app_id: AppId,
        fetcher: Arc<dyn PolicyFetcher>,
        presenter: Arc<dyn Presenter>,
        tx: ProviderEventSender,
    ) -> Self {
        Self {
            placement,
            partner_id,
            app_id,
            fetcher,
            presenter,
            tx,
            offer: Arc::new(Mutex::new(None)),
            handle: Handle::current(),
        }
    }

    /// The cached offer, if any
    pub fn offer(&self) -> Option<Offer> {
        self.lock_offer().clone()
    }

    fn lock_offer(&self) -> std::sync::MutexGuard<'_, Option<Offer>> {
        self.offer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AdProvider for FetchingProvider {
    fn load(&self, context: &SlotContext) {
        let context = context.clone();
        let placement = self.placement.clone();
        let partner_id = self.partner_id.clone();
        let app_id = self.app_id.clone();
        let fetcher = self.fetcher.clone();
        let offer_slot = self.offer.clone();
        let tx = self.tx.clone();

        *self.lock_offer() = None;

        self.handle.spawn(async move {
            let send = |kind| {
                let _ = tx.send(ProviderEvent::new(&context, kind));
            };

            let update = match fetcher.fetch(&partner_id, &app_id, &placement).await {
                Ok(update) => update,
                Err(e) => {
                    debug!(placement = %placement, error = %e, "Policy fetch failed");
                    send(ProviderEventKind::LoadFailed(e));
                    return;
                }
            };

            let offer = update.has_offer().then(|| Offer {
                request_id: update
                    .request_id
                    .as_deref()
                    .filter(|id| !id.is_empty())
                    .map(RequestId::new)
                    .unwrap_or_else(RequestId::generate),
                final_url: update.final_url.clone().unwrap_or_default(),
                track_url: update.track_url.clone(),
                fallback: update.fallback.unwrap_or(false),
            });

            send(ProviderEventKind::PolicyUpdated(update));

            match offer {
                Some(offer) => {
                    info!(placement = %placement, request_id = %offer.request_id, "Offer cached");
                    *offer_slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(offer);
                    send(ProviderEventKind::Loaded);
                }
                None => {
                    debug!(placement = %placement, "Server declined placement");
                    send(ProviderEventKind::LoadFailed(AdError::NoFill));
                }
            }
        });
    }

    fn show(&self, context: &SlotContext) {
        let Some(offer) = self.lock_offer().take() else {
            warn!(placement = %context.placement, "Show requested with no cached offer");
            let _ = self.tx.send(ProviderEvent::new(
                context,
                ProviderEventKind::DisplayFailed(AdError::AdNotReady),
            ));
            return;
        };

        let reporter = PresentationReporter::new(context.clone(), offer.impression(), self.tx.clone());
        self.presenter.present(offer, reporter);
    }

    fn is_ready(&self) -> bool {
        self.lock_offer().is_some()
    }

    fn destroy(&self) {
        *self.lock_offer() = None;
    }
}
