//! Collaborator interfaces for adgate
//!
//! This crate defines the boundary between the slot orchestrator and the
//! things it drives: the ad provider that loads and presents creatives, and
//! the scheduler that delivers delayed retries. It contains no ad-network
//! code itself.

mod mock;
mod scheduler;
mod traits;

pub use mock::*;
pub use scheduler::*;
pub use traits::*;
