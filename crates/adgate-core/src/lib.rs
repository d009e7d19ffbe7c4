//! Gating engine and ad slot orchestration for adgate
//!
//! This crate is the heart of adgate, containing:
//! - Threshold resolution (local defaults vs. server overrides with a TTL)
//! - Gate evaluation (session gate and post-show cooldown)
//! - Slot state machine (Idle -> Loading -> Ready -> Showing -> Idle)
//! - Load backoff and fixed-delay show/display retries
//!
//! Nothing here is thread-safe on purpose. One owner (the service loop)
//! holds the [`AdGate`] and feeds it provider completions and fired retries.

mod engine;
mod events;
mod gate;
mod policy_store;
mod slot;

pub use engine::*;
pub use events::*;
pub use gate::*;
pub use policy_store::*;
pub use slot::*;
