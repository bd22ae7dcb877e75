//! HTTP API layer for twinchat.
//!
//! - **Endpoints**: JSON `POST` endpoints grouped by feature
//! - **Middleware**: per-request region resolution and session authentication
//! - **Extractors**: current user and the request's region services
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::router;
pub use middleware::{AppState, app};
