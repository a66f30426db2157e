//! Seeded `Math.random` for a context.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rquickjs::{Ctx, Function, Object};
use std::cell::RefCell;

/// 2^-53, the spacing of doubles in [0.5, 1)
const UNIT: f64 = 1.0 / (1u64 << 53) as f64;

/// PRNG state owned by one context
#[derive(Debug, Clone)]
pub struct ContextRng {
    rng: ChaCha8Rng,
}

impl ContextRng {
    /// Create a generator from a seed
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Uniform double in [0, 1) with 53 bits of randomness
    pub fn next_unit(&mut self) -> f64 {
        (self.rng.next_u64() >> 11) as f64 * UNIT
    }

    /// Replace `Math.random` in `ctx` with a function drawing from this
    /// generator. The generator moves into the context and lives as long
    /// as the function does.
    pub(crate) fn install<'js>(self, ctx: &Ctx<'js>) -> rquickjs::Result<()> {
        let state = RefCell::new(self);
        let random = Function::new(ctx.clone(), move || state.borrow_mut().next_unit())?;
        let math: Object<'js> = ctx.globals().get("Math")?;
        math.set("random", random)
    }
}
