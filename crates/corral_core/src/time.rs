//! Host clock readers.
//!
//! Only the host-backed policy reads these. The inert policy answers every
//! time query with a constant and never touches the host clock.

use crate::error::{CoreError, CoreResult};
use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Real-time clock, read in whole milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WallClock;

impl WallClock {
    /// Milliseconds since the Unix epoch, truncated toward zero
    ///
    /// # Errors
    ///
    /// Returns error if the host clock reads before the epoch or past
    /// the range of `i64` milliseconds
    pub fn now_millis() -> CoreResult<i64> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| CoreError::ClockUnavailable {
                reason: e.to_string(),
            })?;
        i64::try_from(elapsed.as_millis()).map_err(|_| CoreError::ClockUnavailable {
            reason: "wall clock out of range".to_string(),
        })
    }
}

/// Monotonic clock, read in fractional milliseconds
///
/// Readings share one process-wide origin, fixed at the first read, so
/// values from different sandboxes in the same process are comparable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonotonicClock;

impl MonotonicClock {
    /// Milliseconds elapsed since the process-wide origin, with
    /// sub-millisecond precision
    #[must_use]
    pub fn now_millis() -> f64 {
        static ORIGIN: OnceLock<Instant> = OnceLock::new();
        let origin = *ORIGIN.get_or_init(Instant::now);
        origin.elapsed().as_secs_f64() * 1_000.0
    }
}
