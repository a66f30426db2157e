//! Sandbox lifecycle and evaluation.
//!
//! A [`Sandbox`] owns one arena and the one engine context carved from it.
//! Construction allocates the arena, builds the context, installs the
//! environment policy and seeds the PRNG; dropping the sandbox tears the
//! context down and then releases the arena.

use crate::arena::{Arena, ArenaError, ArenaUsage, DEFAULT_ARENA_BYTES};
use crate::marshal::{self, BoundedText, ERROR_CAPACITY, EvalError, RESULT_CAPACITY};
use crate::policy::{EnvironmentPolicy, Variant};
use crate::random::ContextRng;
use corral_core::{CapabilitySet, CoreError, CoreResult};
use rquickjs::context::EvalOptions;
use rquickjs::{Context, Runtime, Value};
use serde::{Deserialize, Serialize};

/// Sandbox configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Arena size in bytes
    pub arena_bytes: i64,
    /// Result text capacity, terminator included
    pub result_capacity: usize,
    /// Error text capacity, terminator included
    pub error_capacity: usize,
}

impl SandboxConfig {
    /// Create a new sandbox config
    #[must_use]
    pub fn new() -> Self {
        Self {
            arena_bytes: DEFAULT_ARENA_BYTES as i64,
            result_capacity: RESULT_CAPACITY,
            error_capacity: ERROR_CAPACITY,
        }
    }

    /// Set the arena size
    #[must_use]
    pub fn with_arena_bytes(mut self, bytes: i64) -> Self {
        self.arena_bytes = bytes;
        self
    }

    /// Set the result text capacity
    #[must_use]
    pub fn with_result_capacity(mut self, capacity: usize) -> Self {
        self.result_capacity = capacity;
        self
    }

    /// Set the error text capacity
    #[must_use]
    pub fn with_error_capacity(mut self, capacity: usize) -> Self {
        self.error_capacity = capacity;
        self
    }

    /// Check the text capacities
    ///
    /// # Errors
    ///
    /// Returns error if a capacity cannot hold even the terminator
    pub fn validate(&self) -> CoreResult<()> {
        if self.result_capacity == 0 {
            return Err(CoreError::InvalidConfig {
                field: "result_capacity".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.error_capacity == 0 {
            return Err(CoreError::InvalidConfig {
                field: "error_capacity".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Sandbox lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    /// The arena could not be obtained
    #[error("Arena allocation failed: {0}")]
    Allocation(#[from] ArenaError),

    /// The engine rejected the arena/policy pair
    #[error("Context construction failed: {0}")]
    Construction(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<SandboxError> for CoreError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::Allocation(ArenaError::Unavailable { requested }) => {
                CoreError::AllocationFailed { requested }
            }
            SandboxError::Allocation(err @ ArenaError::TooSmall { .. }) => {
                CoreError::ConstructionFailed {
                    reason: err.to_string(),
                }
            }
            SandboxError::Construction(reason) => CoreError::ConstructionFailed { reason },
            SandboxError::InvalidConfig(reason) => CoreError::InvalidConfig {
                field: "sandbox".to_string(),
                reason,
            },
        }
    }
}

/// One bounded-memory engine context and its environment
pub struct Sandbox {
    // Field order is drop order: the context goes before its runtime, which
    // hands the arena region back when it drops.
    context: Context,
    runtime: Runtime,
    arena: Arena,
    policy: EnvironmentPolicy,
    config: SandboxConfig,
    seed: u64,
}

impl Sandbox {
    /// Create a sandbox under this build's policy
    ///
    /// # Errors
    ///
    /// Returns error if the arena cannot be allocated or the context
    /// cannot be constructed on it
    pub fn new(config: SandboxConfig) -> Result<Self, SandboxError> {
        Self::with_policy(config, EnvironmentPolicy::for_build())
    }

    /// Create a sandbox under an explicit policy
    ///
    /// # Errors
    ///
    /// See [`Sandbox::new`]
    pub fn with_policy(
        config: SandboxConfig,
        policy: EnvironmentPolicy,
    ) -> Result<Self, SandboxError> {
        config
            .validate()
            .map_err(|e| SandboxError::InvalidConfig(e.to_string()))?;

        let mut arena = Arena::reserve(config.arena_bytes)?;

        let runtime = arena.runtime().map_err(|e| {
            tracing::warn!(arena_bytes = arena.limit(), error = %e, "runtime construction failed");
            SandboxError::Construction(e.to_string())
        })?;

        let context = Context::full(&runtime).map_err(|e| {
            tracing::warn!(arena_bytes = arena.limit(), error = %e, "context construction failed");
            SandboxError::Construction(e.to_string())
        })?;

        let seed = policy.seed();
        context
            .with(|ctx| {
                policy.install(&ctx)?;
                ContextRng::new(seed).install(&ctx)
            })
            .map_err(|e| {
                tracing::warn!(error = %e, "environment policy install failed");
                SandboxError::Construction(e.to_string())
            })?;

        tracing::debug!(
            arena_bytes = arena.limit(),
            variant = %policy.variant(),
            "sandbox initialized"
        );

        Ok(Self {
            context,
            runtime,
            arena,
            policy,
            config,
            seed,
        })
    }

    /// Get the sandbox configuration
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Policy variant installed in the context
    #[must_use]
    pub fn variant(&self) -> Variant {
        self.policy.variant()
    }

    /// Host capabilities visible to scripts
    #[must_use]
    pub fn capabilities(&self) -> CapabilitySet {
        self.policy.capabilities()
    }

    /// Seed the context's PRNG started from
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Current engine accounting against the arena
    #[must_use]
    pub fn arena_usage(&self) -> ArenaUsage {
        self.arena.usage(&self.runtime)
    }

    /// Run a collection pass over the context's values
    pub fn collect_garbage(&self) {
        self.runtime.run_gc();
    }

    /// Evaluate `source` as top-level script code
    ///
    /// Runs to completion or to the first uncaught exception. On success the
    /// completion value comes back as bounded text; on an exception the
    /// thrown value does. State the script changed before throwing stays
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::Exception`] if the script throws
    pub fn eval(&mut self, source: impl Into<Vec<u8>>) -> Result<BoundedText, EvalError> {
        let source = source.into();
        let result_capacity = self.config.result_capacity;
        let error_capacity = self.config.error_capacity;

        let mut options = EvalOptions::default();
        options.global = true;
        options.strict = false;

        let outcome = self.context.with(|ctx| {
            match ctx.eval_with_options::<Value, _>(source, options) {
                Ok(value) => Ok(marshal::value_text(&ctx, &value, result_capacity)),
                Err(rquickjs::Error::Exception) => {
                    let thrown = ctx.catch();
                    Err(EvalError::Exception(marshal::exception_text(
                        &ctx,
                        &thrown,
                        error_capacity,
                    )))
                }
                Err(other) => Err(EvalError::Exception(BoundedText::copy(
                    &other.to_string(),
                    error_capacity,
                ))),
            }
        });

        match &outcome {
            Ok(text) => tracing::debug!(
                bytes = text.len(),
                truncated = text.is_truncated(),
                "evaluation succeeded"
            ),
            Err(err) => tracing::debug!(error = %err, "evaluation threw"),
        }
        outcome
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        tracing::debug!(arena_bytes = self.arena.limit(), "sandbox torn down");
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("arena", &self.arena)
            .field("policy", &self.policy)
            .field("config", &self.config)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}
