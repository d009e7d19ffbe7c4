//! Command types for the adgate line protocol

use adgate_util::{HostErrorCode, PlacementId};
use serde::{Deserialize, Serialize};

use crate::{API_VERSION, LoadOutcome, ServiceStateSnapshot, ShowOutcome};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self { request_id, command }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    NotInitialized,
    AdNotReady,
    Unspecified,
}

impl From<HostErrorCode> for ErrorCode {
    fn from(code: HostErrorCode) -> Self {
        match code {
            HostErrorCode::NotInitialized => ErrorCode::NotInitialized,
            HostErrorCode::AdNotReady => ErrorCode::AdNotReady,
            HostErrorCode::Unspecified => ErrorCode::Unspecified,
        }
    }
}

/// All commands the host may send
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Record partner/app identity and optionally override the server URL
    Initialize {
        partner_id: String,
        app_id: String,
        #[serde(default)]
        base_url: Option<String>,
    },

    /// Get current state
    GetState,

    /// Evaluate the gate now
    CanShowAd,

    /// Record a show that happened outside the slot lifecycle
    DidShowAd,

    /// Overwrite the server override unit
    UpdateServerRestrictions {
        #[serde(default)]
        cooldown_seconds: Option<i64>,
        #[serde(default)]
        session_gate_seconds: Option<i64>,
        #[serde(default)]
        ttl_seconds: Option<i64>,
    },

    Load { placement: PlacementId },

    Show { placement: PlacementId },

    IsReady { placement: PlacementId },

    /// Tear down a slot; pending retries for it become no-ops
    Destroy { placement: PlacementId },

    /// Stop the service
    Shutdown,

    /// Ping for keepalive
    Ping,
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    State(ServiceStateSnapshot),
    Initialized,
    CanShow { allowed: bool },
    ShowRecorded,
    RestrictionsUpdated,
    Load(LoadOutcome),
    Show(ShowOutcome),
    Ready { ready: bool },
    Destroyed,
    ShuttingDown,
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trip() {
        let req = Request::new(
            7,
            Command::Show {
                placement: PlacementId::new("main"),
            },
        );
        let json = serde_json::to_string(&req).unwrap();
        let parsed: Request = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.request_id, 7);
        assert!(matches!(parsed.command, Command::Show { placement } if placement.as_str() == "main"));
    }

    #[test]
    fn restrictions_command_allows_missing_fields() {
        let json = r#"{"request_id":1,"command":{"type":"update_server_restrictions","cooldown_seconds":60}}"#;
        let parsed: Request = serde_json::from_str(json).unwrap();

        match parsed.command {
            Command::UpdateServerRestrictions {
                cooldown_seconds,
                session_gate_seconds,
                ttl_seconds,
            } => {
                assert_eq!(cooldown_seconds, Some(60));
                assert_eq!(session_gate_seconds, None);
                assert_eq!(ttl_seconds, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn error_response_serialization() {
        let resp = Response::error(3, ErrorInfo::new(HostErrorCode::AdNotReady.into(), "nothing cached"));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("ad_not_ready"));
    }
}
