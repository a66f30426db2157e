//! Seed sources for the script PRNG.

use crate::error::{CoreError, CoreResult};
use rand::RngCore;
use rand::rngs::OsRng;

/// Seed used when no entropy is wanted or the host has none to give
pub const FIXED_SEED: u64 = 12345;

/// Draw a seed from eight bytes of host entropy
///
/// # Errors
///
/// Returns error if the host entropy source fails
pub fn entropy_seed() -> CoreResult<u64> {
    let mut bytes = [0u8; 8];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CoreError::EntropyUnavailable {
            reason: e.to_string(),
        })?;
    Ok(u64::from_le_bytes(bytes))
}
