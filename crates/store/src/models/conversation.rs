//! Conversation and message records.

use serde::{Deserialize, Serialize};

use super::Record;

/// Kind of conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
}

/// A conversation inside a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub workspace_id: Option<String>,
    pub kind: ConversationKind,
    pub member_ids: Vec<String>,
    pub created_by: String,
    pub created_at: i64,
    #[serde(default)]
    pub last_message_at: Option<i64>,
}

impl Conversation {
    /// Whether the user is a member.
    #[must_use]
    pub fn has_member(&self, user_id: &str) -> bool {
        self.member_ids.iter().any(|m| m == user_id)
    }

    /// For a direct conversation, the member that is not `user_id`.
    #[must_use]
    pub fn direct_peer(&self, user_id: &str) -> Option<&str> {
        if self.kind != ConversationKind::Direct {
            return None;
        }
        self.member_ids
            .iter()
            .map(String::as_str)
            .find(|m| *m != user_id)
    }
}

impl Record for Conversation {
    const COLLECTION: &'static str = "conversations";
}

/// A message posted to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub text: String,
    pub created_at: i64,
}

impl Record for Message {
    const COLLECTION: &'static str = "messages";
}
