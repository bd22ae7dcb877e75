//! Device / login session registry.

use std::net::IpAddr;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::json;
use tracing::{debug, info};
use twinchat_common::config::SessionConfig;
use twinchat_common::{AppError, AppResult, IdGenerator, now_millis};
use twinchat_store::models::{Device, DeviceType};
use twinchat_store::{DocumentStore, Query, Repository, patch};

use super::geolocation::GeoLocator;
use super::session::{SessionRevoker, revoke_with_retry};

#[allow(clippy::expect_used)] // literal pattern
static BROWSER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(Edg|EdgA|EdgiOS|OPR|SamsungBrowser|Firefox|FxiOS|CriOS|Chrome|Version)/(\d+)")
        .expect("valid browser pattern")
});

/// What the user agent says about a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUserAgent {
    pub device_name: String,
    pub device_type: DeviceType,
}

/// Derive a display name and device class from a user agent string.
#[must_use]
pub fn parse_user_agent(user_agent: Option<&str>) -> ParsedUserAgent {
    let Some(ua) = user_agent.map(str::trim).filter(|ua| !ua.is_empty()) else {
        return ParsedUserAgent {
            device_name: "Unknown device".to_string(),
            device_type: DeviceType::Unknown,
        };
    };

    let (os, device_type) = if ua.contains("iPad") {
        (Some("iPadOS"), DeviceType::Tablet)
    } else if ua.contains("iPhone") || ua.contains("iPod") {
        (Some("iOS"), DeviceType::Mobile)
    } else if ua.contains("Android") {
        let class = if ua.contains("Mobile") {
            DeviceType::Mobile
        } else {
            DeviceType::Tablet
        };
        (Some("Android"), class)
    } else if ua.contains("Windows") {
        (Some("Windows"), DeviceType::Desktop)
    } else if ua.contains("Macintosh") || ua.contains("Mac OS X") {
        (Some("macOS"), DeviceType::Desktop)
    } else if ua.contains("CrOS") {
        (Some("ChromeOS"), DeviceType::Desktop)
    } else if ua.contains("Linux") {
        (Some("Linux"), DeviceType::Desktop)
    } else {
        (None, DeviceType::Unknown)
    };

    let browser = detect_browser(ua);
    let device_name = match (browser, os) {
        (Some(browser), Some(os)) => format!("{browser} on {os}"),
        (Some(browser), None) => browser,
        (None, Some(os)) => os.to_string(),
        (None, None) => "Unknown device".to_string(),
    };

    ParsedUserAgent {
        device_name,
        device_type,
    }
}

fn detect_browser(ua: &str) -> Option<String> {
    let tokens: Vec<(&str, &str)> = BROWSER_RE
        .captures_iter(ua)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect();
    let find = |names: &[&str]| {
        tokens
            .iter()
            .find(|(name, _)| names.contains(name))
            .map(|(_, version)| *version)
    };

    // Most specific first: Edge and Opera also announce Chrome
    let candidates: [(&[&str], &str); 6] = [
        (&["Edg", "EdgA", "EdgiOS"][..], "Edge"),
        (&["OPR"][..], "Opera"),
        (&["SamsungBrowser"][..], "Samsung Internet"),
        (&["Firefox", "FxiOS"][..], "Firefox"),
        (&["CriOS", "Chrome"][..], "Chrome"),
        (&["Version"][..], "Safari"),
    ];
    for (names, label) in candidates {
        if let Some(version) = find(names) {
            if label == "Safari" && !ua.contains("Safari") {
                continue;
            }
            return Some(format!("{label} {version}"));
        }
    }
    None
}

/// Input for recording a login or an active session.
#[derive(Debug, Clone, Default)]
pub struct RecordDeviceInput {
    pub user_id: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub session_token: Option<String>,
}

/// Tracks the devices each user is signed in on.
#[derive(Clone)]
pub struct DeviceRegistry {
    devices: Repository<Device>,
    revoker: Option<Arc<dyn SessionRevoker>>,
    geo: Arc<GeoLocator>,
    policy: SessionConfig,
    id_gen: IdGenerator,
}

impl DeviceRegistry {
    /// Create a new registry.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        revoker: Option<Arc<dyn SessionRevoker>>,
        geo: Arc<GeoLocator>,
        policy: SessionConfig,
    ) -> Self {
        Self {
            devices: Repository::new(store),
            revoker,
            geo,
            policy,
            id_gen: IdGenerator::new(),
        }
    }

    /// Devices of a user, most recently active first.
    pub async fn get_devices(&self, user_id: &str) -> AppResult<Vec<Device>> {
        self.devices
            .find(
                &Query::new()
                    .eq("user_id", user_id)
                    .order_desc("last_active_at"),
            )
            .await
    }

    /// Record a login. A known session token refreshes its device instead
    /// of adding a new one.
    pub async fn record_device(&self, input: RecordDeviceInput) -> AppResult<Device> {
        let parsed = parse_user_agent(input.user_agent.as_deref());
        let location = self.locate(input.ip_address.as_deref()).await;
        let now = now_millis();

        if let Some(token) = input.session_token.as_deref() {
            if let Some(existing) = self
                .devices
                .find_one(
                    Query::new()
                        .eq("user_id", input.user_id.as_str())
                        .eq("session_token", token),
                )
                .await?
            {
                let mut changes = json!({
                    "device_name": parsed.device_name,
                    "device_type": parsed.device_type,
                    "ip_address": input.ip_address,
                    "user_agent": input.user_agent,
                    "last_active_at": now,
                });
                if location.is_some() {
                    changes["location"] = json!(location);
                }
                return self
                    .devices
                    .update(&existing.id, patch(changes))
                    .await?
                    .ok_or_else(|| AppError::NotFound("Device not found".to_string()));
            }
        }

        let device = Device {
            id: self.id_gen.generate(),
            user_id: input.user_id,
            device_name: parsed.device_name,
            device_type: parsed.device_type,
            ip_address: input.ip_address,
            location,
            user_agent: input.user_agent,
            session_token: input.session_token,
            created_at: now,
            last_active_at: now,
        };
        let device = self.devices.create(&device).await?;
        info!(device_id = %device.id, user_id = %device.user_id, name = %device.device_name, "Device recorded");
        Ok(device)
    }

    /// Bump `last_active_at` on a device the user owns.
    pub async fn touch_device(&self, device_id: &str, user_id: &str) -> AppResult<()> {
        self.owned_device(device_id, user_id).await?;
        self.devices
            .update(device_id, patch(json!({ "last_active_at": now_millis() })))
            .await?;
        Ok(())
    }

    /// Device bound to a session token.
    pub async fn find_by_session_token(&self, session_token: &str) -> AppResult<Option<Device>> {
        self.devices
            .find_one(Query::new().eq("session_token", session_token))
            .await
    }

    /// Sign a device out and forget it.
    ///
    /// The device must belong to `user_id`; a device owned by someone else
    /// is reported exactly like a missing one. Session revocation is retried
    /// and then given up on without failing the delete.
    pub async fn delete_device(&self, device_id: &str, user_id: &str) -> AppResult<()> {
        let device = self.owned_device(device_id, user_id).await?;

        if let Some(token) = device.session_token.as_deref() {
            let outcome = revoke_with_retry(self.revoker.as_ref(), token, &self.policy).await;
            outcome.log("device.session.revoke");
        }

        self.devices.delete(device_id).await?;
        info!(device_id, user_id, "Device removed");
        Ok(())
    }

    async fn owned_device(&self, device_id: &str, user_id: &str) -> AppResult<Device> {
        self.devices
            .find_by_id(device_id)
            .await?
            .filter(|d| d.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("Device not found".to_string()))
    }

    async fn locate(&self, ip_address: Option<&str>) -> Option<String> {
        let ip: IpAddr = ip_address?.parse().ok()?;
        let info = self.geo.locate(ip).await;
        debug!(%ip, found = info.is_some(), "Device location lookup");
        info.map(|i| i.label())
    }
}
