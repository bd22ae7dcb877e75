//! Messaging endpoints.

use axum::{Json, Router, routing::post};
use serde::{Deserialize, Serialize};
use twinchat_common::AppResult;
use twinchat_core::CreateDirectConversationInput;
use twinchat_store::models::{Conversation, ConversationKind, Message};
use validator::Validate;

use crate::{
    extractors::{AuthUser, RegionServices},
    middleware::AppState,
    response::{ApiResponse, timestamp},
};

/// Open conversation request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub user_id: String,
    pub workspace_id: Option<String>,
}

/// Send message request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: String,
    #[validate(length(min = 1))]
    pub text: String,
}

/// List messages request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesRequest {
    pub conversation_id: String,
    pub limit: Option<u64>,
}

/// Conversation response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub id: String,
    pub workspace_id: Option<String>,
    pub kind: ConversationKind,
    pub member_ids: Vec<String>,
    pub created_at: String,
    pub last_message_at: Option<String>,
}

impl From<Conversation> for ConversationResponse {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            workspace_id: c.workspace_id,
            kind: c.kind,
            member_ids: c.member_ids,
            created_at: timestamp(c.created_at),
            last_message_at: c.last_message_at.map(timestamp),
        }
    }
}

/// Message response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub text: String,
    pub created_at: String,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            conversation_id: m.conversation_id,
            sender_id: m.sender_id,
            text: m.text,
            created_at: timestamp(m.created_at),
        }
    }
}

/// Open a direct conversation. Refused when the target has blocked the
/// caller (or vice versa) or only accepts messages from contacts.
async fn create_conversation(
    AuthUser(user): AuthUser,
    RegionServices { services, .. }: RegionServices,
    Json(req): Json<CreateConversationRequest>,
) -> AppResult<ApiResponse<ConversationResponse>> {
    let conversation = services
        .chat
        .create_direct_conversation(
            &user.id,
            CreateDirectConversationInput {
                target_user_id: req.user_id,
                workspace_id: req.workspace_id,
            },
        )
        .await?;
    Ok(ApiResponse::ok(conversation.into()))
}

/// Send a message.
async fn create_message(
    AuthUser(user): AuthUser,
    RegionServices { services, .. }: RegionServices,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<ApiResponse<MessageResponse>> {
    req.validate()?;
    let message = services
        .chat
        .send_message(&user.id, &req.conversation_id, &req.text)
        .await?;
    Ok(ApiResponse::ok(message.into()))
}

/// Get messages in a conversation, newest first.
async fn list_messages(
    AuthUser(user): AuthUser,
    RegionServices { services, .. }: RegionServices,
    Json(req): Json<ListMessagesRequest>,
) -> AppResult<ApiResponse<Vec<MessageResponse>>> {
    let messages = services
        .chat
        .get_messages(&user.id, &req.conversation_id, req.limit)
        .await?;
    Ok(ApiResponse::ok(
        messages.into_iter().map(Into::into).collect(),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/conversations/create", post(create_conversation))
        .route("/messages/create", post(create_message))
        .route("/messages/list", post(list_messages))
}
