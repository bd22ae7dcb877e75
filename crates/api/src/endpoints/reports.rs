//! User report endpoints.

use axum::{Json, Router, routing::post};
use serde::{Deserialize, Serialize};
use twinchat_common::AppResult;
use twinchat_core::CreateReportInput;
use twinchat_store::models::{Report, ReportStatus, ReportType};

use crate::{
    extractors::{AuthUser, RegionServices},
    middleware::AppState,
    response::{ApiResponse, timestamp},
};

/// Create report request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportRequest {
    pub reported_user_id: String,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub reason: String,
}

/// Report response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub id: String,
    pub reporter_id: String,
    pub reported_user_id: String,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub reason: String,
    pub status: ReportStatus,
    pub admin_notes: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<String>,
    pub created_at: String,
}

impl From<Report> for ReportResponse {
    fn from(r: Report) -> Self {
        Self {
            id: r.id,
            reporter_id: r.reporter_id,
            reported_user_id: r.reported_user_id,
            report_type: r.report_type,
            reason: r.reason,
            status: r.status,
            admin_notes: r.admin_notes,
            resolved_by: r.resolved_by,
            resolved_at: r.resolved_at.map(timestamp),
            created_at: timestamp(r.created_at),
        }
    }
}

/// Report a user.
async fn create_report(
    AuthUser(user): AuthUser,
    RegionServices { services, .. }: RegionServices,
    Json(req): Json<CreateReportRequest>,
) -> AppResult<ApiResponse<ReportResponse>> {
    let report = services
        .users
        .create_report(
            &user.id,
            CreateReportInput {
                reported_user_id: req.reported_user_id,
                report_type: req.report_type,
                reason: req.reason,
            },
        )
        .await?;
    Ok(ApiResponse::ok(report.into()))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/create", post(create_report))
}
