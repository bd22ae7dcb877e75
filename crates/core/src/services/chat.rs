//! Conversations and messages, gated by the permission engine.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};
use twinchat_common::{AppError, AppResult, IdGenerator, now_millis};
use twinchat_store::models::{Conversation, ConversationKind, Message};
use twinchat_store::{DocumentStore, Query, Repository, patch};

use super::permission::{ChatPermissionEngine, PermissionDecision};

/// Maximum message length in characters.
pub const MAX_MESSAGE_LEN: usize = 4000;

/// Default and maximum page size for message listing.
pub const DEFAULT_MESSAGE_LIMIT: u64 = 50;
pub const MAX_MESSAGE_LIMIT: u64 = 100;

/// Input for opening a direct conversation.
#[derive(Debug, Clone)]
pub struct CreateDirectConversationInput {
    pub target_user_id: String,
    pub workspace_id: Option<String>,
}

/// Chat operations.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Whether `sender_id` may message `target_id`.
    async fn check_chat_permission(
        &self,
        sender_id: &str,
        target_id: &str,
        workspace_id: Option<&str>,
    ) -> AppResult<PermissionDecision>;

    /// Open (or return the existing) direct conversation with a user.
    async fn create_direct_conversation(
        &self,
        sender_id: &str,
        input: CreateDirectConversationInput,
    ) -> AppResult<Conversation>;

    /// Post a message. Direct conversations re-check permission on every send.
    async fn send_message(
        &self,
        sender_id: &str,
        conversation_id: &str,
        text: &str,
    ) -> AppResult<Message>;

    /// Latest messages, newest first.
    async fn get_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
        limit: Option<u64>,
    ) -> AppResult<Vec<Message>>;
}

/// [`ChatService`] over a region's document store.
#[derive(Clone)]
pub struct StoreChatService {
    conversations: Repository<Conversation>,
    messages: Repository<Message>,
    permissions: ChatPermissionEngine,
    id_gen: IdGenerator,
}

impl StoreChatService {
    /// Create a new chat service.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, permissions: ChatPermissionEngine) -> Self {
        Self {
            conversations: Repository::new(Arc::clone(&store)),
            messages: Repository::new(store),
            permissions,
            id_gen: IdGenerator::new(),
        }
    }

    fn direct_conversation_id(&self, workspace_id: Option<&str>, a: &str, b: &str) -> String {
        format!(
            "dm:{}:{}",
            workspace_id.unwrap_or("-"),
            self.id_gen.unordered_pair_id(a, b)
        )
    }

    /// Load a conversation the user belongs to. Non-members get the same
    /// answer as for a missing conversation.
    async fn member_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> AppResult<Conversation> {
        self.conversations
            .find_by_id(conversation_id)
            .await?
            .filter(|c| c.has_member(user_id))
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))
    }
}

#[async_trait]
impl ChatService for StoreChatService {
    async fn check_chat_permission(
        &self,
        sender_id: &str,
        target_id: &str,
        workspace_id: Option<&str>,
    ) -> AppResult<PermissionDecision> {
        self.permissions
            .check(sender_id, target_id, workspace_id)
            .await
    }

    async fn create_direct_conversation(
        &self,
        sender_id: &str,
        input: CreateDirectConversationInput,
    ) -> AppResult<Conversation> {
        if sender_id == input.target_user_id {
            return Err(AppError::BadRequest(
                "Cannot open a conversation with yourself".to_string(),
            ));
        }

        let workspace_id = input.workspace_id.as_deref();
        self.permissions
            .check(sender_id, &input.target_user_id, workspace_id)
            .await?
            .into_result()?;

        let id = self.direct_conversation_id(workspace_id, sender_id, &input.target_user_id);
        if let Some(existing) = self.conversations.find_by_id(&id).await? {
            return Ok(existing);
        }

        let conversation = Conversation {
            id: id.clone(),
            workspace_id: input.workspace_id.clone(),
            kind: ConversationKind::Direct,
            member_ids: vec![sender_id.to_string(), input.target_user_id.clone()],
            created_by: sender_id.to_string(),
            created_at: now_millis(),
            last_message_at: None,
        };

        match self.conversations.create(&conversation).await {
            Ok(created) => {
                info!(conversation_id = %created.id, sender_id, "Direct conversation created");
                Ok(created)
            }
            Err(AppError::Conflict(_)) => self
                .conversations
                .find_by_id(&id)
                .await?
                .ok_or_else(|| AppError::Storage("conversation vanished after conflict".to_string())),
            Err(e) => Err(e),
        }
    }

    async fn send_message(
        &self,
        sender_id: &str,
        conversation_id: &str,
        text: &str,
    ) -> AppResult<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Message text is required".to_string()));
        }
        if text.chars().count() > MAX_MESSAGE_LEN {
            return Err(AppError::Validation(format!(
                "Message exceeds {MAX_MESSAGE_LEN} characters"
            )));
        }

        let conversation = self.member_conversation(sender_id, conversation_id).await?;
        if let Some(peer) = conversation.direct_peer(sender_id) {
            self.permissions
                .check(sender_id, peer, conversation.workspace_id.as_deref())
                .await?
                .into_result()?;
        }

        let message = Message {
            id: self.id_gen.generate(),
            conversation_id: conversation.id.clone(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            created_at: now_millis(),
        };
        let message = self.messages.create(&message).await?;

        if let Err(e) = self
            .conversations
            .update(
                &conversation.id,
                patch(json!({ "last_message_at": message.created_at })),
            )
            .await
        {
            warn!(conversation_id = %conversation.id, error = %e, "Failed to bump conversation");
        }

        Ok(message)
    }

    async fn get_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
        limit: Option<u64>,
    ) -> AppResult<Vec<Message>> {
        self.member_conversation(user_id, conversation_id).await?;

        let limit = limit
            .unwrap_or(DEFAULT_MESSAGE_LIMIT)
            .clamp(1, MAX_MESSAGE_LIMIT);
        self.messages
            .find(
                &Query::new()
                    .eq("conversation_id", conversation_id)
                    .order_desc("created_at")
                    .limit(limit),
            )
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::permission::{DenyReason, SocialGraph};
    use crate::services::user::testing::seed_user;
    use crate::services::user::{PrivacySettings, StoreUserService, UserService};
    use twinchat_common::Region;
    use twinchat_store::MemoryStore;

    struct Fixture {
        users: Arc<dyn UserService>,
        chat: StoreChatService,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new(Region::Cn));
        let users = Arc::new(StoreUserService::new(Arc::clone(&store), None));
        let graph: Arc<dyn SocialGraph> = users.clone();
        let chat = StoreChatService::new(store, ChatPermissionEngine::new(graph));
        Fixture { users, chat }
    }

    fn direct(target: &str) -> CreateDirectConversationInput {
        CreateDirectConversationInput {
            target_user_id: target.to_string(),
            workspace_id: Some("ws1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_direct_conversation_is_reused() {
        let f = fixture();
        let a = seed_user(f.users.as_ref(), "a").await;
        let b = seed_user(f.users.as_ref(), "b").await;

        let first = f.chat.create_direct_conversation(&a.id, direct(&b.id)).await.unwrap();
        let second = f.chat.create_direct_conversation(&b.id, direct(&a.id)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.has_member(&a.id) && first.has_member(&b.id));
    }

    #[tokio::test]
    async fn test_block_prevents_conversation_and_messages() {
        let f = fixture();
        let a = seed_user(f.users.as_ref(), "a").await;
        let b = seed_user(f.users.as_ref(), "b").await;

        let conversation = f.chat.create_direct_conversation(&a.id, direct(&b.id)).await.unwrap();
        f.chat.send_message(&a.id, &conversation.id, "hi").await.unwrap();

        f.users.block_user(&b.id, &a.id, None).await.unwrap();

        let decision = f.chat.check_chat_permission(&a.id, &b.id, None).await.unwrap();
        assert_eq!(decision.reason, Some(DenyReason::Blocked));
        let reverse = f.chat.check_chat_permission(&b.id, &a.id, None).await.unwrap();
        assert_eq!(reverse.reason, Some(DenyReason::Blocked));

        let err = f.chat.send_message(&a.id, &conversation.id, "hello?").await.unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));
        let err = f.chat.create_direct_conversation(&a.id, direct(&b.id)).await.unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_privacy_requires_contact() {
        let f = fixture();
        let a = seed_user(f.users.as_ref(), "a").await;
        let b = seed_user(f.users.as_ref(), "b").await;
        f.users
            .update_privacy_settings(
                &b.id,
                PrivacySettings {
                    allow_non_friend_messages: false,
                },
            )
            .await
            .unwrap();

        let decision = f.chat.check_chat_permission(&a.id, &b.id, None).await.unwrap();
        assert_eq!(decision.reason, Some(DenyReason::NotAContact));

        f.users.send_friend_request(&a.id, &b.id).await.unwrap();
        f.users.accept_friend_request(&b.id, &a.id).await.unwrap();
        assert!(f.chat.check_chat_permission(&a.id, &b.id, None).await.unwrap().allowed);

        // a block denies between contacts; unblocking keeps the friendship
        f.users.block_user(&b.id, &a.id, None).await.unwrap();
        let decision = f.chat.check_chat_permission(&a.id, &b.id, None).await.unwrap();
        assert_eq!(decision.reason, Some(DenyReason::Blocked));
        f.users.unblock_user(&b.id, &a.id).await.unwrap();
        assert!(f.chat.check_chat_permission(&a.id, &b.id, None).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_messages_are_member_only() {
        let f = fixture();
        let a = seed_user(f.users.as_ref(), "a").await;
        let b = seed_user(f.users.as_ref(), "b").await;
        let c = seed_user(f.users.as_ref(), "c").await;

        let conversation = f.chat.create_direct_conversation(&a.id, direct(&b.id)).await.unwrap();
        f.chat.send_message(&a.id, &conversation.id, "one").await.unwrap();
        f.chat.send_message(&b.id, &conversation.id, "two").await.unwrap();

        let messages = f.chat.get_messages(&a.id, &conversation.id, None).await.unwrap();
        assert_eq!(messages.len(), 2);

        let err = f.chat.get_messages(&c.id, &conversation.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = f.chat.send_message(&c.id, &conversation.id, "hey").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_message_validation() {
        let f = fixture();
        let a = seed_user(f.users.as_ref(), "a").await;
        let b = seed_user(f.users.as_ref(), "b").await;
        let conversation = f.chat.create_direct_conversation(&a.id, direct(&b.id)).await.unwrap();

        let err = f.chat.send_message(&a.id, &conversation.id, "   ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let long = "x".repeat(MAX_MESSAGE_LEN + 1);
        let err = f.chat.send_message(&a.id, &conversation.id, &long).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
