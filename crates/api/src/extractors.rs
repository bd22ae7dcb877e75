//! Request extractors.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use twinchat_common::{AppError, Region};
use twinchat_core::Services;
use twinchat_store::models::User;

use crate::middleware::{RequestRegion, Session};

/// Authenticated user extractor.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by auth middleware
        parts
            .extensions
            .get::<Session>()
            .map(|s| Self(s.user.clone()))
            .ok_or(AppError::Unauthorized)
    }
}

/// Authenticated session extractor, when the device matters.
#[derive(Debug, Clone)]
pub struct AuthSession(pub Session);

impl<S> FromRequestParts<S> for AuthSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .map(Self)
            .ok_or(AppError::Unauthorized)
    }
}

/// Services of the region the request was routed to.
#[derive(Clone)]
pub struct RegionServices {
    pub region: Region,
    pub services: Arc<Services>,
}

impl<S> FromRequestParts<S> for RegionServices
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestRegion>()
            .map(|r| Self {
                region: r.region,
                services: Arc::clone(&r.services),
            })
            .ok_or_else(|| AppError::Internal("request region was not resolved".to_string()))
    }
}

/// Client address and user agent, as seen by the region middleware.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<RequestRegion>()
            .and_then(|r| r.client_ip)
            .map(|ip| ip.to_string());
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(Self { ip, user_agent })
    }
}
