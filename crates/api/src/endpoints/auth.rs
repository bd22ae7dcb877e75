//! Verification code and registration endpoints.

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use tracing::info;
use twinchat_common::{AppError, AppResult, IdGenerator};
use twinchat_core::{CreateUserInput, RecordDeviceInput};
use twinchat_store::models::CodeType;
use validator::Validate;

use super::i::MeResponse;
use crate::{
    extractors::{AuthSession, ClientInfo, RegionServices},
    middleware::AppState,
    response::{Ack, ApiResponse, timestamp},
};

/// Send verification code request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendCodeRequest {
    #[validate(email)]
    pub email: String,
    #[serde(rename = "type")]
    pub code_type: CodeType,
}

/// Send verification code response. The code itself only travels by
/// the delivery channel.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCodeResponse {
    pub expires_at: String,
}

/// Verify code request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[serde(rename = "type")]
    pub code_type: CodeType,
}

/// Verify code response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeResponse {
    pub verified: bool,
}

/// Registration request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[validate(length(min = 1, max = 100))]
    pub username: String,
    #[validate(length(max = 100))]
    pub full_name: Option<String>,
}

/// Registration response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user: MeResponse,
    pub token: String,
}

/// Issue a verification code and hand it to the delivery channel.
async fn send_code(
    State(state): State<AppState>,
    RegionServices { services, .. }: RegionServices,
    client: ClientInfo,
    Json(req): Json<SendCodeRequest>,
) -> AppResult<ApiResponse<SendCodeResponse>> {
    req.validate()?;

    let issued = services
        .verification
        .create_code(&req.email, req.code_type, client.ip.as_deref())
        .await?
        .into_result()?;
    state
        .delivery
        .deliver(&req.email, req.code_type, &issued.code)
        .await?;

    Ok(ApiResponse::ok(SendCodeResponse {
        expires_at: timestamp(issued.expires_at),
    }))
}

/// Check a password-reset code. A successful check consumes it.
///
/// Registration codes are only accepted by `/auth/register`, which checks
/// and consumes them in one step.
async fn verify_code(
    RegionServices { services, .. }: RegionServices,
    Json(req): Json<VerifyCodeRequest>,
) -> AppResult<ApiResponse<VerifyCodeResponse>> {
    req.validate()?;
    if req.code_type == CodeType::Register {
        return Err(AppError::BadRequest(
            "Registration codes are checked by /auth/register".to_string(),
        ));
    }

    services
        .verification
        .verify_code(&req.email, &req.code, req.code_type)
        .await?
        .into_result()?;

    Ok(ApiResponse::ok(VerifyCodeResponse { verified: true }))
}

/// Create an account from a registration code and open a session.
async fn register(
    RegionServices { region, services }: RegionServices,
    client: ClientInfo,
    Json(req): Json<RegisterRequest>,
) -> AppResult<ApiResponse<RegisterResponse>> {
    req.validate()?;

    services
        .verification
        .verify_code(&req.email, &req.code, CodeType::Register)
        .await?
        .into_result()?;

    let user = services
        .users
        .create_user(CreateUserInput {
            email: req.email,
            username: req.username,
            full_name: req.full_name,
            avatar_url: None,
        })
        .await?;

    let token = IdGenerator::new().generate_token();
    services
        .devices
        .record_device(RecordDeviceInput {
            user_id: user.id.clone(),
            user_agent: client.user_agent,
            ip_address: client.ip,
            session_token: Some(token.clone()),
        })
        .await?;

    info!(user_id = %user.id, region = %region, "User registered");
    Ok(ApiResponse::ok(RegisterResponse {
        user: user.into(),
        token,
    }))
}

/// End the current session.
async fn signout(
    AuthSession(session): AuthSession,
    RegionServices { services, .. }: RegionServices,
) -> AppResult<ApiResponse<Ack>> {
    services
        .devices
        .delete_device(&session.device_id, &session.user.id)
        .await?;
    Ok(Ack::ok())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/verification-code/send", post(send_code))
        .route("/verification-code/verify", post(verify_code))
        .route("/register", post(register))
        .route("/signout", post(signout))
}
