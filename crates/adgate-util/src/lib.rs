//! Shared utilities for adgate
//!
//! This crate provides:
//! - ID types (PlacementId, RequestId, PartnerId, AppId)
//! - Time utilities (monotonic instants, injectable clocks)
//! - The ad error taxonomy
//! - Exponential retry backoff
//! - Default config path lookup

mod backoff;
mod error;
mod ids;
mod paths;
mod time;

pub use backoff::*;
pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
