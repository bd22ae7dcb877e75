//! Device (login session) endpoints.

use axum::{Json, Router, routing::post};
use serde::{Deserialize, Serialize};
use twinchat_common::AppResult;
use twinchat_store::models::{Device, DeviceType};

use crate::{
    extractors::{AuthSession, RegionServices},
    middleware::AppState,
    response::{Ack, ApiResponse, timestamp},
};

/// A device as shown to its owner. Session tokens never leave the server.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    pub id: String,
    pub device_name: String,
    pub device_type: DeviceType,
    pub ip_address: Option<String>,
    pub location: Option<String>,
    pub created_at: String,
    pub last_active_at: String,
    /// Whether this is the device making the request.
    pub current: bool,
}

impl DeviceResponse {
    fn new(device: Device, current_id: &str) -> Self {
        Self {
            current: device.id == current_id,
            id: device.id,
            device_name: device.device_name,
            device_type: device.device_type,
            ip_address: device.ip_address,
            location: device.location,
            created_at: timestamp(device.created_at),
            last_active_at: timestamp(device.last_active_at),
        }
    }
}

/// Delete device request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDeviceRequest {
    pub device_id: String,
}

async fn list_devices(
    AuthSession(session): AuthSession,
    RegionServices { services, .. }: RegionServices,
) -> AppResult<ApiResponse<Vec<DeviceResponse>>> {
    let devices = services.devices.get_devices(&session.user.id).await?;
    Ok(ApiResponse::ok(
        devices
            .into_iter()
            .map(|d| DeviceResponse::new(d, &session.device_id))
            .collect(),
    ))
}

/// Sign a device out. Its backend session is revoked on a best-effort basis.
async fn delete_device(
    AuthSession(session): AuthSession,
    RegionServices { services, .. }: RegionServices,
    Json(req): Json<DeleteDeviceRequest>,
) -> AppResult<ApiResponse<Ack>> {
    services
        .devices
        .delete_device(&req.device_id, &session.user.id)
        .await?;
    Ok(Ack::ok())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/list", post(list_devices))
        .route("/delete", post(delete_device))
}
