//! Shared types for the adgate API

use adgate_util::{HostErrorCode, PlacementId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle state of a single ad slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Idle,
    Loading,
    Ready,
    Showing,
    FailedLoad,
    FailedShow,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotState::Idle => "idle",
            SlotState::Loading => "loading",
            SlotState::Ready => "ready",
            SlotState::Showing => "showing",
            SlotState::FailedLoad => "failed_load",
            SlotState::FailedShow => "failed_show",
        };
        f.write_str(name)
    }
}

/// Why the gate is closed, if it is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    /// Gate is open
    Allowed,
    /// Not enough time since session start
    SessionGate,
    /// Not enough time since the last show
    Cooldown,
}

/// Where an effective threshold came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSource {
    Local,
    Server,
}

/// Result of a gate evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: GateReason,
    pub effective_session_gate: Duration,
    pub session_gate_source: ThresholdSource,
    pub effective_cooldown: Duration,
    pub cooldown_source: ThresholdSource,
}

/// Live server override values, as reported in state snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerOverrideView {
    pub cooldown: Option<Duration>,
    pub session_gate: Option<Duration>,
    pub ttl: Option<Duration>,
    /// Time since the override was written
    pub age: Duration,
}

/// Outcome of a `load()` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// A provider load was issued
    Started,
    /// A load is already outstanding for this slot
    AlreadyLoading,
    /// The slot is presenting; it refills itself when the ad is hidden
    Showing,
    /// No provider attached, unknown placement, or slot destroyed
    NotInitialized,
}

/// Outcome of a `show()` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ShowOutcome {
    /// The provider was asked to present
    Presenting,
    /// Gate closed; `show()` will be retried after `retry_in`
    Deferred { reason: GateReason, retry_in: Duration },
    /// Provider has nothing presentable; a reload was requested
    NotReady,
    /// Already presenting
    AlreadyShowing,
    /// No provider attached, unknown placement, or slot destroyed
    NotInitialized,
}

impl ShowOutcome {
    /// Host-visible error for outcomes that did not present or defer
    pub fn host_error(&self) -> Option<HostErrorCode> {
        match self {
            ShowOutcome::NotReady => Some(HostErrorCode::AdNotReady),
            ShowOutcome::NotInitialized => Some(HostErrorCode::NotInitialized),
            ShowOutcome::Presenting
            | ShowOutcome::Deferred { .. }
            | ShowOutcome::AlreadyShowing => None,
        }
    }
}

/// Per-slot status for state snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotStatus {
    pub placement: PlacementId,
    pub state: SlotState,
    pub retry_attempt: u32,
    pub ready: bool,
    pub alive: bool,
}

/// Full service state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStateSnapshot {
    pub api_version: u32,
    pub initialized: bool,
    pub gate: GateDecision,
    pub server_override: Option<ServerOverrideView>,
    pub since_session_start: Duration,
    pub since_last_show: Option<Duration>,
    #[serde(default)]
    pub slots: Vec<SlotStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deferred_outcome_serialization() {
        let outcome = ShowOutcome::Deferred {
            reason: GateReason::Cooldown,
            retry_in: Duration::from_secs(10),
        };

        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"outcome\":\"deferred\""));
        assert!(json.contains("cooldown"));
    }

    #[test]
    fn show_outcomes_map_to_host_errors() {
        assert_eq!(ShowOutcome::NotReady.host_error(), Some(HostErrorCode::AdNotReady));
        assert_eq!(
            ShowOutcome::NotInitialized.host_error(),
            Some(HostErrorCode::NotInitialized)
        );
        assert_eq!(ShowOutcome::Presenting.host_error(), None);
    }

    #[test]
    fn slot_state_display_matches_serde() {
        let json = serde_json::to_string(&SlotState::FailedLoad).unwrap();
        assert_eq!(json, format!("\"{}\"", SlotState::FailedLoad));
    }
}
