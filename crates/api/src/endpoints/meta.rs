//! Meta endpoints.

use axum::{Router, routing::post};
use serde::Serialize;
use twinchat_common::Region;

use crate::{extractors::RegionServices, middleware::AppState, response::ApiResponse};

/// Server metadata response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaResponse {
    pub name: String,
    pub version: String,
    /// Region this request was routed to.
    pub region: Region,
}

/// Get server metadata.
async fn meta(RegionServices { region, .. }: RegionServices) -> ApiResponse<MetaResponse> {
    ApiResponse::ok(MetaResponse {
        name: "twinchat".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        region,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(meta).get(meta))
}
