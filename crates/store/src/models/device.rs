//! Device / login session record.

use serde::{Deserialize, Serialize};

use super::Record;

/// Coarse device class derived from the user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    Unknown,
}

/// Binds a login session token to the device it was issued on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub user_id: String,
    pub device_name: String,
    pub device_type: DeviceType,
    #[serde(default)]
    pub ip_address: Option<String>,
    /// "City, CC" when geolocation succeeded.
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    pub created_at: i64,
    pub last_active_at: i64,
}

impl Record for Device {
    const COLLECTION: &'static str = "user_devices";
}
