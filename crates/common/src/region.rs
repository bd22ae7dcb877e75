//! Deployment regions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Region a request or user is served from.
///
/// Each region owns an independent backend store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    /// China-region store.
    Cn,
    /// Global-region store.
    Global,
}

impl Region {
    /// Both regions, in a stable order.
    pub const ALL: [Self; 2] = [Self::Cn, Self::Global];

    /// Lowercase tag used in logs and persisted records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cn => "cn",
            Self::Global => "global",
        }
    }

    /// The opposite region, used for status mirroring.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Cn => Self::Global,
            Self::Global => Self::Cn,
        }
    }

    /// Map an ISO 3166-1 alpha-2 country code to a region.
    ///
    /// Only mainland China maps to [`Region::Cn`].
    #[must_use]
    pub fn from_country_code(code: &str) -> Self {
        if code.trim().eq_ignore_ascii_case("CN") {
            Self::Cn
        } else {
            Self::Global
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Region setting as written in deployment configuration (`CN` | `INTL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentRegion {
    /// China deployment.
    #[serde(rename = "CN", alias = "cn")]
    Cn,
    /// International deployment.
    #[serde(rename = "INTL", alias = "intl")]
    Intl,
}

impl From<DeploymentRegion> for Region {
    fn from(value: DeploymentRegion) -> Self {
        match value {
            DeploymentRegion::Cn => Self::Cn,
            DeploymentRegion::Intl => Self::Global,
        }
    }
}

impl FromStr for DeploymentRegion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CN" => Ok(Self::Cn),
            "INTL" => Ok(Self::Intl),
            other => Err(format!("unknown deployment region: {other}")),
        }
    }
}
