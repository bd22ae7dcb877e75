//! Admin endpoints. Admin rights are checked by the user service.

use axum::{Json, Router, routing::post};
use serde::Deserialize;
use twinchat_common::AppResult;
use twinchat_core::UpdateReportInput;
use twinchat_store::models::ReportStatus;
use validator::Validate;

use super::reports::ReportResponse;
use crate::{
    extractors::{AuthUser, RegionServices},
    middleware::AppState,
    response::ApiResponse,
};

/// List reports request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListReportsRequest {
    pub status: Option<ReportStatus>,
}

/// Update report request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReportRequest {
    pub report_id: String,
    pub status: ReportStatus,
    #[validate(length(max = 2000))]
    pub admin_notes: Option<String>,
}

async fn list_reports(
    AuthUser(admin): AuthUser,
    RegionServices { services, .. }: RegionServices,
    Json(req): Json<ListReportsRequest>,
) -> AppResult<ApiResponse<Vec<ReportResponse>>> {
    let reports = services.users.get_all_reports(&admin.id, req.status).await?;
    Ok(ApiResponse::ok(reports.into_iter().map(Into::into).collect()))
}

async fn update_report(
    AuthUser(admin): AuthUser,
    RegionServices { services, .. }: RegionServices,
    Json(req): Json<UpdateReportRequest>,
) -> AppResult<ApiResponse<ReportResponse>> {
    req.validate()?;
    let report = services
        .users
        .update_report(
            &admin.id,
            &req.report_id,
            UpdateReportInput {
                status: req.status,
                admin_notes: req.admin_notes,
            },
        )
        .await?;
    Ok(ApiResponse::ok(report.into()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reports/list", post(list_reports))
        .route("/reports/update", post(update_report))
}
