//! corral Core Types
//!
//! Pure types shared by the sandbox and its front ends: the error
//! taxonomy, the host capabilities a policy may expose, and the clock and
//! seed readers backing them. Nothing here depends on the script engine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capability;
pub mod error;
pub mod seed;
pub mod time;

// Re-exports
pub use capability::{Capability, CapabilitySet};
pub use error::{CoreError, CoreResult};
pub use seed::{FIXED_SEED, entropy_seed};
pub use time::{MonotonicClock, WallClock};
