//! ID generation utilities.

use ulid::Ulid;
use uuid::Uuid;

/// ID generator for records.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new ULID-based record ID (lowercase, sortable).
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Generate an opaque session token.
    ///
    /// Two random UUIDs, no time component.
    #[must_use]
    pub fn generate_token(&self) -> String {
        format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
    }

    /// Deterministic ID for a directed pair of users.
    ///
    /// Used where the store must reject a second record for the same pair.
    #[must_use]
    pub fn pair_id(&self, from: &str, to: &str) -> String {
        format!("{from}:{to}")
    }

    /// Deterministic ID for an unordered pair of users.
    #[must_use]
    pub fn unordered_pair_id(&self, a: &str, b: &str) -> String {
        if a <= b {
            self.pair_id(a, b)
        } else {
            self.pair_id(b, a)
        }
    }
}
