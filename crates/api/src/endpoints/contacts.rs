//! Contact (friend) endpoints.

use axum::{Json, Router, routing::post};
use serde::{Deserialize, Serialize};
use twinchat_common::AppResult;
use twinchat_store::models::{ContactRelation, ContactStatus};

use crate::{
    extractors::{AuthUser, RegionServices},
    middleware::AppState,
    response::{ApiResponse, timestamp},
};

/// Request naming the other user.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactUserRequest {
    pub user_id: String,
}

/// Contact edge, seen from the caller's side.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResponse {
    pub id: String,
    /// The other user.
    pub user_id: String,
    pub requester_id: String,
    pub status: ContactStatus,
    pub created_at: String,
    pub accepted_at: Option<String>,
}

impl ContactResponse {
    fn new(edge: ContactRelation, viewer_id: &str) -> Self {
        Self {
            user_id: edge.peer_of(viewer_id).to_string(),
            id: edge.id,
            requester_id: edge.requester_id,
            status: edge.status,
            created_at: timestamp(edge.created_at),
            accepted_at: edge.accepted_at.map(timestamp),
        }
    }
}

#[derive(Serialize)]
pub struct RemovedResponse {
    pub removed: bool,
}

#[derive(Serialize)]
pub struct RelationResponse {
    pub friends: bool,
}

async fn send_request(
    AuthUser(user): AuthUser,
    RegionServices { services, .. }: RegionServices,
    Json(req): Json<ContactUserRequest>,
) -> AppResult<ApiResponse<ContactResponse>> {
    let edge = services
        .users
        .send_friend_request(&user.id, &req.user_id)
        .await?;
    Ok(ApiResponse::ok(ContactResponse::new(edge, &user.id)))
}

async fn accept_request(
    AuthUser(user): AuthUser,
    RegionServices { services, .. }: RegionServices,
    Json(req): Json<ContactUserRequest>,
) -> AppResult<ApiResponse<ContactResponse>> {
    let edge = services
        .users
        .accept_friend_request(&user.id, &req.user_id)
        .await?;
    Ok(ApiResponse::ok(ContactResponse::new(edge, &user.id)))
}

async fn remove(
    AuthUser(user): AuthUser,
    RegionServices { services, .. }: RegionServices,
    Json(req): Json<ContactUserRequest>,
) -> AppResult<ApiResponse<RemovedResponse>> {
    let removed = services.users.remove_friend(&user.id, &req.user_id).await?;
    Ok(ApiResponse::ok(RemovedResponse { removed }))
}

async fn list(
    AuthUser(user): AuthUser,
    RegionServices { services, .. }: RegionServices,
) -> AppResult<ApiResponse<Vec<ContactResponse>>> {
    let friends = services.users.get_friends(&user.id).await?;
    Ok(ApiResponse::ok(
        friends
            .into_iter()
            .map(|e| ContactResponse::new(e, &user.id))
            .collect(),
    ))
}

/// Pending requests addressed to the caller.
async fn requests(
    AuthUser(user): AuthUser,
    RegionServices { services, .. }: RegionServices,
) -> AppResult<ApiResponse<Vec<ContactResponse>>> {
    let pending = services.users.get_pending_requests(&user.id).await?;
    Ok(ApiResponse::ok(
        pending
            .into_iter()
            .map(|e| ContactResponse::new(e, &user.id))
            .collect(),
    ))
}

async fn relation(
    AuthUser(user): AuthUser,
    RegionServices { services, .. }: RegionServices,
    Json(req): Json<ContactUserRequest>,
) -> AppResult<ApiResponse<RelationResponse>> {
    let friends = services
        .users
        .check_friend_relation(&user.id, &req.user_id)
        .await?;
    Ok(ApiResponse::ok(RelationResponse { friends }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/request", post(send_request))
        .route("/accept", post(accept_request))
        .route("/remove", post(remove))
        .route("/list", post(list))
        .route("/requests", post(requests))
        .route("/relation", post(relation))
}
