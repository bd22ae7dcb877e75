//! API endpoints.

mod admin;
mod auth;
mod blocking;
mod contacts;
mod devices;
mod i;
mod messaging;
mod meta;
mod reports;

use axum::Router;

use crate::middleware::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/meta", meta::router())
        .nest("/i", i::router())
        .nest("/i/devices", devices::router())
        .nest("/blocking", blocking::router())
        .nest("/contacts", contacts::router())
        .nest("/reports", reports::router())
        .nest("/admin", admin::router())
        .nest("/messaging", messaging::router())
}
