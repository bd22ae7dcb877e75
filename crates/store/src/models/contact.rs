//! Contact (friendship) record.

use serde::{Deserialize, Serialize};

use super::Record;

/// Acceptance state of a contact edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    Pending,
    Accepted,
}

/// Directed contact edge from `requester_id` to `addressee_id`.
///
/// Only accepted edges count as friendship, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRelation {
    pub id: String,
    pub requester_id: String,
    pub addressee_id: String,
    pub status: ContactStatus,
    pub created_at: i64,
    #[serde(default)]
    pub accepted_at: Option<i64>,
}

impl ContactRelation {
    /// The other side of the edge, seen from `user_id`.
    #[must_use]
    pub fn peer_of(&self, user_id: &str) -> &str {
        if self.requester_id == user_id {
            &self.addressee_id
        } else {
            &self.requester_id
        }
    }
}

impl Record for ContactRelation {
    const COLLECTION: &'static str = "contacts";
}
