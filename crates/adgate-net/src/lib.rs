//! Network collaborators for adgate
//!
//! This crate provides:
//! - [`HttpPolicyFetcher`]: asks the ad server whether a placement may show
//! - [`HttpImpressionTracker`]: best-effort impression beacons
//! - [`FetchingProvider`]: an [`adgate_provider::AdProvider`] that loads by
//!   fetching policy and presents through a pluggable [`Presenter`]

mod fetcher;
mod presenter;
mod provider;
mod tracker;

pub use fetcher::*;
pub use presenter::*;
pub use provider::*;
pub use tracker::*;
