//! Blocking endpoints.

use axum::{Json, Router, routing::post};
use serde::{Deserialize, Serialize};
use twinchat_common::AppResult;
use twinchat_store::models::BlockRelation;
use validator::Validate;

use crate::{
    extractors::{AuthUser, RegionServices},
    middleware::AppState,
    response::{ApiResponse, timestamp},
};

/// Block user request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BlockUserRequest {
    pub user_id: String,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Unblock user request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnblockUserRequest {
    pub user_id: String,
}

/// Blocking response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingResponse {
    pub id: String,
    pub created_at: String,
    pub blocked_id: String,
    pub reason: Option<String>,
}

impl From<BlockRelation> for BlockingResponse {
    fn from(b: BlockRelation) -> Self {
        Self {
            id: b.id,
            created_at: timestamp(b.created_at),
            blocked_id: b.blocked_id,
            reason: b.reason,
        }
    }
}

/// Unblock response.
#[derive(Serialize)]
pub struct UnblockResponse {
    pub removed: bool,
}

/// Block a user.
async fn block_user(
    AuthUser(user): AuthUser,
    RegionServices { services, .. }: RegionServices,
    Json(req): Json<BlockUserRequest>,
) -> AppResult<ApiResponse<BlockingResponse>> {
    req.validate()?;
    let blocking = services
        .users
        .block_user(&user.id, &req.user_id, req.reason)
        .await?;
    Ok(ApiResponse::ok(blocking.into()))
}

/// Unblock a user.
async fn unblock_user(
    AuthUser(user): AuthUser,
    RegionServices { services, .. }: RegionServices,
    Json(req): Json<UnblockUserRequest>,
) -> AppResult<ApiResponse<UnblockResponse>> {
    let removed = services.users.unblock_user(&user.id, &req.user_id).await?;
    Ok(ApiResponse::ok(UnblockResponse { removed }))
}

/// Get list of blocked users.
async fn list_blocking(
    AuthUser(user): AuthUser,
    RegionServices { services, .. }: RegionServices,
) -> AppResult<ApiResponse<Vec<BlockingResponse>>> {
    let blockings = services.users.get_blocked_users(&user.id).await?;
    Ok(ApiResponse::ok(
        blockings.into_iter().map(Into::into).collect(),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(block_user))
        .route("/delete", post(unblock_user))
        .route("/list", post(list_blocking))
}
