//! Event types for adgate -> host streaming

use adgate_util::{HostErrorCode, PlacementId};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{API_VERSION, GateReason, SlotState};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: adgate_util::wall_now(),
            payload,
        }
    }
}

/// All notifications the service emits to the host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Slot moved between lifecycle states
    SlotStateChanged {
        placement: PlacementId,
        from: SlotState,
        to: SlotState,
    },

    /// An ad is cached and ready to show
    AdLoaded { placement: PlacementId },

    /// A load failed; another attempt is scheduled
    AdLoadFailed {
        placement: PlacementId,
        error: HostErrorCode,
        attempt: u32,
        retry_in: Duration,
    },

    /// `show()` was held back by the gate
    ShowDeferred {
        placement: PlacementId,
        reason: GateReason,
        retry_in: Duration,
    },

    AdDisplayed { placement: PlacementId },

    AdHidden { placement: PlacementId },

    AdClicked { placement: PlacementId },

    /// Presentation failed; recovery is scheduled
    AdDisplayFailed {
        placement: PlacementId,
        error: HostErrorCode,
        retry_in: Duration,
    },

    /// Server overrides were written
    ServerRestrictionsUpdated {
        cooldown: Option<Duration>,
        session_gate: Option<Duration>,
        ttl: Option<Duration>,
    },

    /// Server overrides expired and local defaults apply again
    ServerRestrictionsExpired,

    /// Service is shutting down
    Shutdown,
}
