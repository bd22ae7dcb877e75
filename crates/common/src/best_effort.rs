//! Outcome of a secondary effect that must never abort the primary operation.

use std::fmt;

/// Result of a best-effort side effect such as session revocation or
/// cross-region status mirroring.
///
/// Callers log it and carry on; it never converts into an `AppError`.
#[must_use = "best-effort outcomes should be logged"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BestEffort {
    /// The effect was applied.
    Applied,
    /// Nothing to do (feature not configured, no token to revoke, ...).
    Skipped(String),
    /// The effect failed after all retries.
    Failed(String),
}

impl BestEffort {
    /// Whether the effect was applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Emit a log line for this outcome under the given operation name.
    pub fn log(&self, operation: &str) {
        match self {
            Self::Applied => tracing::debug!(operation, "Best-effort operation applied"),
            Self::Skipped(reason) => {
                tracing::debug!(operation, reason = %reason, "Best-effort operation skipped");
            }
            Self::Failed(reason) => {
                tracing::warn!(operation, reason = %reason, "Best-effort operation failed");
            }
        }
    }
}

impl fmt::Display for BestEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => f.write_str("applied"),
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}
