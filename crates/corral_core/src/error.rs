//! Core error types for corral.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The arena could not be obtained from the host
    AllocationFailed {
        /// Requested arena size in bytes
        requested: i64,
    },

    /// The engine rejected the arena/policy pair
    ConstructionFailed {
        /// Engine-provided reason
        reason: String,
    },

    /// Invalid configuration value
    InvalidConfig {
        /// Offending field
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// The host entropy source did not answer
    EntropyUnavailable {
        /// Source-provided reason
        reason: String,
    },

    /// A host clock could not be read
    ClockUnavailable {
        /// Source-provided reason
        reason: String,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailed { requested } => {
                write!(f, "Arena allocation failed for {} bytes", requested)
            }
            Self::ConstructionFailed { reason } => {
                write!(f, "Context construction failed: {}", reason)
            }
            Self::InvalidConfig { field, reason } => {
                write!(f, "Invalid config for {}: {}", field, reason)
            }
            Self::EntropyUnavailable { reason } => {
                write!(f, "Entropy unavailable: {}", reason)
            }
            Self::ClockUnavailable { reason } => write!(f, "Clock unavailable: {}", reason),
        }
    }
}

impl std::error::Error for CoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidConfig {
            field: "result_capacity".to_string(),
            reason: "must be non-zero".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Invalid config for result_capacity: must be non-zero"
        );
    }

    #[test]
    fn test_allocation_failure_mentions_size() {
        let err = CoreError::AllocationFailed { requested: -1 };
        assert!(err.to_string().contains("-1"));
    }

    #[test]
    fn test_construction_failure_keeps_reason() {
        let err = CoreError::ConstructionFailed {
            reason: "out of memory".to_string(),
        };
        assert_eq!(err.to_string(), "Context construction failed: out of memory");
    }

    #[test]
    fn test_error_equality() {
        let err1 = CoreError::AllocationFailed { requested: 16 };
        let err2 = CoreError::AllocationFailed { requested: 16 };
        assert_eq!(err1, err2);

        let err3 = CoreError::EntropyUnavailable {
            reason: "no device".to_string(),
        };
        assert_ne!(err1, err3);
    }
}
