//! User record.

use serde::{Deserialize, Serialize};
use twinchat_common::Region;

use super::Record;

/// Presence status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    Offline,
    Away,
    Busy,
}

/// A registered user. Never hard-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Lower-cased email.
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub status: UserStatus,
    /// Epoch millis of the last heartbeat or status change.
    #[serde(default)]
    pub last_seen_at: Option<i64>,
    pub region: Region,
    /// Whether users who are not accepted contacts may start a conversation.
    #[serde(default = "default_true")]
    pub allow_non_friend_messages: bool,
    #[serde(default)]
    pub is_admin: bool,
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

const fn default_true() -> bool {
    true
}

impl Record for User {
    const COLLECTION: &'static str = "users";
}
