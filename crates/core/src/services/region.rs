//! Per-request data region resolution.
//!
//! Signals, strongest first: explicit deployment setting, request host,
//! client IP geolocation. When nothing is conclusive the request goes to
//! the global region, or is rejected when `deployment.fail_closed` is set.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, warn};
use twinchat_common::config::DeploymentConfig;
use twinchat_common::{AppError, AppResult, Region};
use url::Url;

use super::geolocation::{GeoInfo, GeoLocator};

/// What the resolver knows about a request.
#[derive(Debug, Clone, Default)]
pub struct RegionContext {
    /// `Host` header or origin URL.
    pub host: Option<String>,
    /// Best-known client address.
    pub client_ip: Option<IpAddr>,
}

impl RegionContext {
    #[must_use]
    pub fn new(host: Option<String>, client_ip: Option<IpAddr>) -> Self {
        Self { host, client_ip }
    }
}

/// Which signal decided the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSource {
    Configuration,
    Host,
    Geolocation,
    Fallback,
}

/// Resolved region, plus the geolocation answer if one was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub region: Region,
    pub source: RegionSource,
    pub geo: Option<GeoInfo>,
}

/// Decides the region for each request.
#[derive(Clone)]
pub struct RegionResolver {
    deployment: DeploymentConfig,
    geo: Arc<GeoLocator>,
}

impl RegionResolver {
    #[must_use]
    pub const fn new(deployment: DeploymentConfig, geo: Arc<GeoLocator>) -> Self {
        Self { deployment, geo }
    }

    /// Resolve the region for a request.
    pub async fn resolve(&self, ctx: &RegionContext) -> AppResult<Resolution> {
        if let Some(region) = self.deployment.region {
            return Ok(Resolution {
                region: region.into(),
                source: RegionSource::Configuration,
                geo: None,
            });
        }

        if let Some(region) = ctx.host.as_deref().and_then(|h| self.region_from_host(h)) {
            debug!(host = ?ctx.host, region = %region, "Region resolved from host");
            return Ok(Resolution {
                region,
                source: RegionSource::Host,
                geo: None,
            });
        }

        if let Some(ip) = ctx.client_ip {
            if let Some(info) = self.geo.locate(ip).await {
                return Ok(Resolution {
                    region: info.region(),
                    source: RegionSource::Geolocation,
                    geo: Some(info),
                });
            }
        }

        if self.deployment.fail_closed {
            warn!(host = ?ctx.host, ip = ?ctx.client_ip, "Region could not be determined; rejecting");
            return Err(AppError::Forbidden(
                "Unable to determine the data region for this request".to_string(),
            ));
        }

        warn!(host = ?ctx.host, ip = ?ctx.client_ip, "Region could not be determined; using global");
        Ok(Resolution {
            region: Region::Global,
            source: RegionSource::Fallback,
            geo: None,
        })
    }

    /// Resolve just the region.
    pub async fn resolve_region(&self, ctx: &RegionContext) -> AppResult<Region> {
        Ok(self.resolve(ctx).await?.region)
    }

    /// Region implied by a host name, if any.
    ///
    /// Configured suffixes win; otherwise a `.cn` TLD means the China region.
    #[must_use]
    pub fn region_from_host(&self, host: &str) -> Option<Region> {
        let host = normalize_host(host)?;

        if self.deployment.cn_hosts.iter().any(|s| host_matches(&host, s)) {
            return Some(Region::Cn);
        }
        if self.deployment.global_hosts.iter().any(|s| host_matches(&host, s)) {
            return Some(Region::Global);
        }
        if host.ends_with(".cn") {
            return Some(Region::Cn);
        }
        None
    }
}

/// Lower-cased host name without scheme, port or trailing dot.
fn normalize_host(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let host = if raw.contains("://") {
        Url::parse(raw).ok()?.host_str()?.to_string()
    } else if raw.starts_with('[') {
        // bracketed IPv6 literal, never a region hint
        return None;
    } else {
        raw.split(':').next().unwrap_or(raw).to_string()
    };

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    (!host.is_empty()).then_some(host)
}

fn host_matches(host: &str, suffix: &str) -> bool {
    let suffix = suffix.trim().trim_start_matches('.').to_ascii_lowercase();
    !suffix.is_empty()
        && (host == suffix
            || host
                .strip_suffix(suffix.as_str())
                .is_some_and(|prefix| prefix.ends_with('.')))
}
