//! Error types for adgate

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy for loading and presenting ads.
///
/// None of these are fatal. Load-side errors are folded into a load failure
/// and retried with backoff; display-side errors are retried after a fixed
/// delay.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AdError {
    #[error("Not initialized")]
    NotInitialized,

    #[error("No fill: server declined the request")]
    NoFill,

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Malformed policy payload: {0}")]
    DecodingError(String),

    #[error("Ad not ready")]
    AdNotReady,

    #[error("Unspecified error: {0}")]
    Unspecified(String),
}

/// The reduced error set visible to the embedding host.
///
/// Only `NotInitialized` and `AdNotReady` are distinguishable; everything
/// else stays in diagnostics and surfaces as `Unspecified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostErrorCode {
    NotInitialized,
    AdNotReady,
    Unspecified,
}

impl AdError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkUnavailable(msg.into())
    }

    pub fn decoding(msg: impl Into<String>) -> Self {
        Self::DecodingError(msg.into())
    }

    pub fn unspecified(msg: impl Into<String>) -> Self {
        Self::Unspecified(msg.into())
    }

    /// Collapse to the code reported to the host.
    pub fn host_code(&self) -> HostErrorCode {
        match self {
            AdError::NotInitialized => HostErrorCode::NotInitialized,
            AdError::AdNotReady => HostErrorCode::AdNotReady,
            AdError::NoFill
            | AdError::NetworkUnavailable(_)
            | AdError::DecodingError(_)
            | AdError::Unspecified(_) => HostErrorCode::Unspecified,
        }
    }
}

pub type AdResult<T> = std::result::Result<T, AdError>;
