//! Host capabilities a sandbox policy may expose to scripts.
//!
//! Loading code and scheduling timers are not capabilities: no policy can
//! grant them. What remains is read access to time and entropy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A capability grants scripts one kind of read from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    /// Read the host's real-time clock (`Date.now`)
    WallClock,

    /// Read the host's monotonic clock (`performance.now`)
    MonotonicClock,

    /// Seed the script PRNG from host entropy
    Entropy,
}

impl Capability {
    /// All capabilities, in canonical order
    pub const ALL: [Capability; 3] = [
        Capability::WallClock,
        Capability::MonotonicClock,
        Capability::Entropy,
    ];

    /// Get a string representation of the capability kind
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::WallClock => "WallClock",
            Self::MonotonicClock => "MonotonicClock",
            Self::Entropy => "Entropy",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind_name())
    }
}

/// A set of capabilities granted to a sandbox
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapabilitySet {
    capabilities: BTreeSet<Capability>,
}

impl CapabilitySet {
    /// Create a new empty capability set
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: BTreeSet::new(),
        }
    }

    /// Create a set holding every capability
    #[must_use]
    pub fn all() -> Self {
        Capability::ALL.into_iter().collect()
    }

    /// Check if a specific capability is granted
    #[must_use]
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Get the number of capabilities
    #[must_use]
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Iterate over capabilities
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self {
            capabilities: iter.into_iter().collect(),
        }
    }
}

impl std::fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.iter().map(Capability::kind_name).collect();
        f.write_str(&names.join(","))
    }
}
