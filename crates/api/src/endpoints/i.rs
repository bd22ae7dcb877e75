//! Endpoints for the authenticated user's own account.

use axum::{Json, Router, routing::post};
use serde::{Deserialize, Serialize};
use twinchat_common::{AppResult, Region};
use twinchat_core::{PrivacySettings, UpdateProfileInput};
use twinchat_store::models::{User, UserStatus};
use validator::Validate;

use crate::{
    extractors::{AuthUser, RegionServices},
    middleware::AppState,
    response::{Ack, ApiResponse, timestamp},
};

/// The caller's own profile.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub id: String,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub status: UserStatus,
    pub last_seen_at: Option<String>,
    pub region: Region,
    pub allow_non_friend_messages: bool,
    pub is_admin: bool,
    pub created_at: String,
}

impl From<User> for MeResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            username: u.username,
            full_name: u.full_name,
            avatar_url: u.avatar_url,
            status: u.status,
            last_seen_at: u.last_seen_at.map(timestamp),
            region: u.region,
            allow_non_friend_messages: u.allow_non_friend_messages,
            is_admin: u.is_admin,
            created_at: timestamp(u.created_at),
        }
    }
}

/// Update profile request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub username: Option<String>,
    #[validate(length(max = 100))]
    pub full_name: Option<String>,
    #[validate(url)]
    pub avatar_url: Option<String>,
}

/// Update status request.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: UserStatus,
}

/// Update status response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusResponse {
    pub user: MeResponse,
    /// Outcome of copying the status to the other region.
    pub mirror: String,
}

async fn me(AuthUser(user): AuthUser) -> ApiResponse<MeResponse> {
    ApiResponse::ok(user.into())
}

async fn update_profile(
    AuthUser(user): AuthUser,
    RegionServices { services, .. }: RegionServices,
    Json(req): Json<UpdateProfileRequest>,
) -> AppResult<ApiResponse<MeResponse>> {
    req.validate()?;

    let updated = services
        .users
        .update_profile(
            &user.id,
            UpdateProfileInput {
                username: req.username,
                full_name: req.full_name,
                avatar_url: req.avatar_url,
            },
        )
        .await?;
    Ok(ApiResponse::ok(updated.into()))
}

async fn update_status(
    AuthUser(user): AuthUser,
    RegionServices { services, .. }: RegionServices,
    Json(req): Json<UpdateStatusRequest>,
) -> AppResult<ApiResponse<UpdateStatusResponse>> {
    let change = services.users.update_status(&user.id, req.status).await?;
    Ok(ApiResponse::ok(UpdateStatusResponse {
        mirror: change.mirror.to_string(),
        user: change.user.into(),
    }))
}

async fn heartbeat(
    AuthUser(user): AuthUser,
    RegionServices { services, .. }: RegionServices,
) -> AppResult<ApiResponse<Ack>> {
    services.users.heartbeat(&user.id).await?;
    Ok(Ack::ok())
}

async fn get_privacy(
    AuthUser(user): AuthUser,
    RegionServices { services, .. }: RegionServices,
) -> AppResult<ApiResponse<PrivacySettings>> {
    let settings = services.users.get_privacy_settings(&user.id).await?;
    Ok(ApiResponse::ok(settings))
}

async fn update_privacy(
    AuthUser(user): AuthUser,
    RegionServices { services, .. }: RegionServices,
    Json(settings): Json<PrivacySettings>,
) -> AppResult<ApiResponse<PrivacySettings>> {
    let settings = services
        .users
        .update_privacy_settings(&user.id, settings)
        .await?;
    Ok(ApiResponse::ok(settings))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(me))
        .route("/update", post(update_profile))
        .route("/status", post(update_status))
        .route("/heartbeat", post(heartbeat))
        .route("/privacy", post(get_privacy))
        .route("/privacy/update", post(update_privacy))
}
