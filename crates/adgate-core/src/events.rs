//! Core events emitted by the gate and slot controllers

use adgate_api::{EventPayload, GateReason, SlotState};
use adgate_util::{AdError, PlacementId};
use std::time::Duration;

/// Events emitted by the core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    SlotStateChanged {
        placement: PlacementId,
        from: SlotState,
        to: SlotState,
    },

    AdLoaded {
        placement: PlacementId,
    },

    /// Load failed; a retry is scheduled after `retry_in`
    AdLoadFailed {
        placement: PlacementId,
        error: AdError,
        attempt: u32,
        retry_in: Duration,
    },

    /// Gate was closed; `show()` is retried after `retry_in`
    ShowDeferred {
        placement: PlacementId,
        reason: GateReason,
        retry_in: Duration,
    },

    AdDisplayed {
        placement: PlacementId,
    },

    AdHidden {
        placement: PlacementId,
    },

    AdClicked {
        placement: PlacementId,
    },

    /// Presentation failed; recovery is scheduled after `retry_in`
    AdDisplayFailed {
        placement: PlacementId,
        error: AdError,
        retry_in: Duration,
    },

    ServerRestrictionsUpdated {
        cooldown: Option<Duration>,
        session_gate: Option<Duration>,
        ttl: Option<Duration>,
    },

    ServerRestrictionsExpired,
}

impl CoreEvent {
    /// Convert to the host-facing payload. Error detail is reduced to the
    /// host error code here.
    pub fn to_payload(&self) -> EventPayload {
        match self.clone() {
            CoreEvent::SlotStateChanged {
                placement,
                from,
                to,
            } => EventPayload::SlotStateChanged {
                placement,
                from,
                to,
            },
            CoreEvent::AdLoaded { placement } => EventPayload::AdLoaded { placement },
            CoreEvent::AdLoadFailed {
                placement,
                error,
                attempt,
                retry_in,
            } => EventPayload::AdLoadFailed {
                placement,
                error: error.host_code(),
                attempt,
                retry_in,
            },
            CoreEvent::ShowDeferred {
                placement,
                reason,
                retry_in,
            } => EventPayload::ShowDeferred {
                placement,
                reason,
                retry_in,
            },
            CoreEvent::AdDisplayed { placement } => EventPayload::AdDisplayed { placement },
            CoreEvent::AdHidden { placement } => EventPayload::AdHidden { placement },
            CoreEvent::AdClicked { placement } => EventPayload::AdClicked { placement },
            CoreEvent::AdDisplayFailed {
                placement,
                error,
                retry_in,
            } => EventPayload::AdDisplayFailed {
                placement,
                error: error.host_code(),
                retry_in,
            },
            CoreEvent::ServerRestrictionsUpdated {
                cooldown,
                session_gate,
                ttl,
            } => EventPayload::ServerRestrictionsUpdated {
                cooldown,
                session_gate,
                ttl,
            },
            CoreEvent::ServerRestrictionsExpired => EventPayload::ServerRestrictionsExpired,
        }
    }
}
