//! Corral sandbox
//!
//! Evaluates untrusted JavaScript inside one bounded-memory QuickJS context.
//! The global environment is fixed at build time: an inert variant where
//! every time query answers 0 and `Math.random` is seeded with a constant,
//! and a host-backed variant (feature `host-backed`) that reads real clocks
//! and OS entropy. Dynamic loading and timers are disabled in both.
//!
//! ```no_run
//! use corral_sandbox::{Sandbox, SandboxConfig};
//!
//! let mut sandbox = Sandbox::new(SandboxConfig::default())?;
//! assert_eq!(sandbox.eval("1 + 2").map(|t| t.into_string()), Ok("3".to_string()));
//! # Ok::<(), corral_sandbox::SandboxError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod arena;
pub mod ffi;
pub mod host;
pub mod marshal;
pub mod policy;
pub mod random;
pub mod sandbox;
pub mod slot;

pub use arena::{
    Arena, ArenaError, ArenaUsage, DEFAULT_ARENA_BYTES, MIN_ARENA_BYTES, live_arena_bytes,
};
pub use host::{HostCapabilities, InertHost, SystemHost};
pub use marshal::{BoundedText, ERROR_CAPACITY, EvalError, RESULT_CAPACITY};
pub use policy::{EnvironmentPolicy, GlobalFn, Variant};
pub use random::ContextRng;
pub use sandbox::{Sandbox, SandboxConfig, SandboxError};
pub use slot::SandboxSlot;
