//! IP geolocation over several public providers.
//!
//! Providers are raced: the first successful answer wins and the rest are
//! cancelled. Every provider call is bounded by the configured timeout.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, select_ok};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};
use twinchat_common::config::{GeoProviderConfig, GeolocationConfig};
use twinchat_common::{AppError, AppResult, Region};

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoInfo {
    /// Upper-case ISO 3166-1 alpha-2 code.
    pub country_code: String,
    pub city: Option<String>,
}

impl GeoInfo {
    /// Data region for the country.
    #[must_use]
    pub fn region(&self) -> Region {
        Region::from_country_code(&self.country_code)
    }

    /// Human-readable location, `"City, CC"` or just `"CC"`.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.city {
            Some(city) => format!("{city}, {}", self.country_code),
            None => self.country_code.clone(),
        }
    }
}

/// A single geolocation provider.
#[async_trait]
pub trait GeoProvider: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Look up an address.
    async fn lookup(&self, ip: IpAddr) -> AppResult<GeoInfo>;
}

/// Provider backed by a JSON HTTP API.
pub struct HttpGeoProvider {
    client: Client,
    config: GeoProviderConfig,
}

impl HttpGeoProvider {
    #[must_use]
    pub const fn new(client: Client, config: GeoProviderConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl GeoProvider for HttpGeoProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn lookup(&self, ip: IpAddr) -> AppResult<GeoInfo> {
        let url = self.config.url.replace("{ip}", &ip.to_string());
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("{}: {e}", self.config.name)))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "{} returned {}",
                self.config.name,
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("{}: {e}", self.config.name)))?;

        parse_geo_response(
            &body,
            &self.config.country_field,
            self.config.city_field.as_deref(),
        )
        .ok_or_else(|| {
            AppError::ExternalService(format!("{} gave no country for {ip}", self.config.name))
        })
    }
}

/// Pull the country code (and city) out of a provider's JSON answer.
///
/// Providers report failures in-band (`{"error": true}`, `{"status": "fail"}`),
/// so anything without a two-letter country code is treated as no answer.
#[must_use]
pub fn parse_geo_response(
    body: &Value,
    country_field: &str,
    city_field: Option<&str>,
) -> Option<GeoInfo> {
    let country = body.get(country_field)?.as_str()?.trim();
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let city = city_field
        .and_then(|field| body.get(field))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    Some(GeoInfo {
        country_code: country.to_ascii_uppercase(),
        city,
    })
}

/// Whether an address can be meaningfully geolocated.
#[must_use]
pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                // 100.64.0.0/10 carrier-grade NAT
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xc0) == 64))
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_public_ip(IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            !(v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80)
        }
    }
}

/// Races a set of providers.
pub struct GeoLocator {
    providers: Vec<Arc<dyn GeoProvider>>,
    timeout: Duration,
}

impl GeoLocator {
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn GeoProvider>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    /// Locator that never answers.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Vec::new(), Duration::ZERO)
    }

    /// Build HTTP providers from configuration, sharing one client.
    pub fn from_config(config: &GeolocationConfig) -> AppResult<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("twinchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;

        let providers = config
            .providers
            .iter()
            .map(|p| Arc::new(HttpGeoProvider::new(client.clone(), p.clone())) as Arc<dyn GeoProvider>)
            .collect();

        Ok(Self::new(providers, timeout))
    }

    /// Whether any provider is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Locate an address. `None` when the address is private, no provider
    /// is configured, or every provider failed or timed out.
    pub async fn locate(&self, ip: IpAddr) -> Option<GeoInfo> {
        if !is_public_ip(ip) {
            debug!(%ip, "Skipping geolocation for non-public address");
            return None;
        }
        if self.providers.is_empty() {
            return None;
        }

        let timeout = self.timeout;
        let lookups: Vec<BoxFuture<'_, Result<(String, GeoInfo), String>>> = self
            .providers
            .iter()
            .map(|provider| {
                let provider = Arc::clone(provider);
                let lookup: BoxFuture<'_, _> = Box::pin(async move {
                    match tokio::time::timeout(timeout, provider.lookup(ip)).await {
                        Ok(Ok(info)) => Ok((provider.name().to_string(), info)),
                        Ok(Err(e)) => Err(format!("{}: {e}", provider.name())),
                        Err(_) => Err(format!("{}: timed out", provider.name())),
                    }
                });
                lookup
            })
            .collect();

        match select_ok(lookups).await {
            Ok(((provider, info), _pending)) => {
                debug!(%ip, provider = %provider, country = %info.country_code, "Geolocated address");
                Some(info)
            }
            Err(last_error) => {
                warn!(%ip, error = %last_error, "All geolocation providers failed");
                None
            }
        }
    }
}
