//! Application state and request middleware.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request, header},
    middleware::{self as axum_middleware, Next},
    response::{IntoResponse, Response},
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, warn};
use twinchat_common::{AppResult, Region};
use twinchat_core::{
    CodeDelivery, GeoInfo, RegionContext, RegionResolver, RegionSource, ServiceRegistry, Services,
};
use twinchat_store::models::User;

use crate::endpoints::router;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ServiceRegistry>,
    pub resolver: RegionResolver,
    pub delivery: Arc<dyn CodeDelivery>,
}

impl AppState {
    #[must_use]
    pub fn new(registry: Arc<ServiceRegistry>, delivery: Arc<dyn CodeDelivery>) -> Self {
        let resolver = registry.region_resolver();
        Self {
            registry,
            resolver,
            delivery,
        }
    }
}

/// Region resolved for the current request, with that region's services.
#[derive(Clone)]
pub struct RequestRegion {
    pub region: Region,
    pub source: RegionSource,
    pub services: Arc<Services>,
    pub client_ip: Option<IpAddr>,
    pub geo: Option<GeoInfo>,
}

/// Authenticated login session.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub device_id: String,
}

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Build the full application: routes, middleware and state.
pub fn app(state: AppState) -> Router {
    router()
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(axum_middleware::from_fn(auth_middleware))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            region_middleware,
        ))
        .with_state(state)
}

/// Host the request was made for. The browser's `Origin` wins over the
/// API host, since a frontend may call a shared API domain.
#[must_use]
pub fn request_host(headers: &HeaderMap) -> Option<String> {
    [header::ORIGIN.as_str(), "x-forwarded-host", header::HOST.as_str()]
        .into_iter()
        .filter_map(|name| headers.get(name)?.to_str().ok())
        .map(|value| value.split(',').next().unwrap_or(value).trim())
        .find(|value| !value.is_empty() && *value != "null")
        .map(str::to_string)
}

/// Client address: first `X-Forwarded-For` hop, `X-Real-IP`, then the peer.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());

    forwarded
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        })
        .or_else(|| peer.map(|p| p.ip()))
}

/// Region middleware: resolves the region and binds its services.
pub async fn region_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ctx = RegionContext::new(request_host(req.headers()), client_ip(req.headers(), peer));

    let bound = match bind_region(&state, &ctx).await {
        Ok(bound) => bound,
        Err(e) => return e.into_response(),
    };
    req.extensions_mut().insert(bound);

    next.run(req).await
}

async fn bind_region(state: &AppState, ctx: &RegionContext) -> AppResult<RequestRegion> {
    let resolution = state.resolver.resolve(ctx).await?;
    let services = state.registry.services(resolution.region).await?;
    Ok(RequestRegion {
        region: resolution.region,
        source: resolution.source,
        services,
        client_ip: ctx.client_ip,
        geo: resolution.geo,
    })
}

/// Authentication middleware.
///
/// A bearer token is a session token recorded in the device registry of
/// the request's region. Unknown tokens leave the request anonymous.
pub async fn auth_middleware(mut req: Request<Body>, next: Next) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    if let (Some(token), Some(bound)) = (token, req.extensions().get::<RequestRegion>().cloned()) {
        match authenticate(&bound.services, &token).await {
            Ok(Some(session)) => {
                req.extensions_mut().insert(session);
            }
            Ok(None) => debug!(region = %bound.region, "Unknown session token"),
            Err(e) => warn!(region = %bound.region, error = %e, "Session lookup failed"),
        }
    }

    next.run(req).await
}

async fn authenticate(services: &Services, token: &str) -> AppResult<Option<Session>> {
    let Some(device) = services.devices.find_by_session_token(token).await? else {
        return Ok(None);
    };
    let user = match services.users.get_user(&device.user_id).await {
        Ok(user) => user,
        Err(twinchat_common::AppError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e),
    };

    if let Err(e) = services.devices.touch_device(&device.id, &user.id).await {
        debug!(device_id = %device.id, error = %e, "Failed to touch device");
    }

    Ok(Some(Session {
        user,
        device_id: device.id,
    }))
}
