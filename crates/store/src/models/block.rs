//! Block relation record.

use serde::{Deserialize, Serialize};

use super::Record;

/// `blocker_id` blocks `blocked_id`. The record id is the directed pair, so
/// the store rejects a second record for the same pair.
///
/// For messaging purposes a block is mutual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRelation {
    pub id: String,
    pub blocker_id: String,
    pub blocked_id: String,
    #[serde(default)]
    pub reason: Option<String>,
    pub created_at: i64,
}

impl Record for BlockRelation {
    const COLLECTION: &'static str = "user_blocks";
}
