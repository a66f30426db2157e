//! Host capabilities injected into the environment policy.
//!
//! A policy never reads the host directly. It asks a [`HostCapabilities`]
//! object, and the inert implementation answers every question with a
//! constant, so the two build variants share one policy implementation.

use corral_core::{
    Capability, CapabilitySet, CoreResult, FIXED_SEED, MonotonicClock, WallClock, entropy_seed,
};

/// What the host lets scripts observe about time and entropy
pub trait HostCapabilities {
    /// Real-time clock in whole milliseconds since the Unix epoch
    fn read_wall_clock(&self) -> i64;

    /// Monotonic clock in fractional milliseconds
    fn read_monotonic_clock(&self) -> f64;

    /// Eight bytes of entropy for the PRNG seed
    ///
    /// # Errors
    ///
    /// Returns error if the host has no entropy to give
    fn read_entropy(&self) -> CoreResult<u64>;

    /// Capabilities this host actually exposes
    fn capabilities(&self) -> CapabilitySet;
}

/// Host that exposes nothing: clocks read 0 and entropy is the fixed seed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InertHost;

impl HostCapabilities for InertHost {
    fn read_wall_clock(&self) -> i64 {
        0
    }

    fn read_monotonic_clock(&self) -> f64 {
        0.0
    }

    fn read_entropy(&self) -> CoreResult<u64> {
        Ok(FIXED_SEED)
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new()
    }
}

/// Host backed by the process's real clocks and OS entropy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemHost;

impl HostCapabilities for SystemHost {
    fn read_wall_clock(&self) -> i64 {
        WallClock::now_millis().unwrap_or(0)
    }

    fn read_monotonic_clock(&self) -> f64 {
        MonotonicClock::now_millis()
    }

    fn read_entropy(&self) -> CoreResult<u64> {
        entropy_seed()
    }

    fn capabilities(&self) -> CapabilitySet {
        Capability::ALL.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inert_host_is_constant() {
        let host = InertHost;
        assert_eq!(host.read_wall_clock(), 0);
        assert_eq!(host.read_monotonic_clock(), 0.0);
        assert_eq!(host.read_entropy().unwrap(), FIXED_SEED);
        assert!(host.capabilities().is_empty());
    }

    #[test]
    fn test_system_host_reads_real_clock() {
        let host = SystemHost;
        assert!(host.read_wall_clock() > 1_700_000_000_000);
        assert!(host.read_monotonic_clock() >= 0.0);
        assert!(host.read_entropy().is_ok());
        assert_eq!(host.capabilities(), CapabilitySet::all());
    }
}
