//! Retry backoff for failed ad loads

use std::time::Duration;

/// Capped exponential backoff: `base ^ min(cap, attempt)` seconds.
///
/// The attempt counter itself is unbounded; only the exponent is capped, so
/// the delay plateaus at `base ^ cap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// Base of the exponent, in seconds
    base: u32,
    /// Largest exponent ever applied
    cap: u32,
}

impl ExponentialBackoff {
    pub const DEFAULT_BASE: u32 = 2;
    pub const DEFAULT_CAP: u32 = 6;

    pub fn new(base: u32, cap: u32) -> Self {
        Self { base, cap }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    /// Delay before retry number `attempt` (1 for the first retry)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(self.cap);
        let secs = u64::from(self.base).saturating_pow(exponent);
        Duration::from_secs(secs)
    }

    /// The plateau delay
    pub fn max_delay(&self) -> Duration {
        self.delay_for(self.cap)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE, Self::DEFAULT_CAP)
    }
}
