//! User report record.

use serde::{Deserialize, Serialize};

use super::Record;

/// Report lifecycle. `Resolved` and `Dismissed` are terminal in practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    /// Lowercase wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }
}

/// What the report is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Spam,
    Harassment,
    InappropriateContent,
    Impersonation,
    Other,
}

/// A report filed by one user against another.
/// Reporter and target never change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub reporter_id: String,
    pub reported_user_id: String,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub reason: String,
    pub status: ReportStatus,
    #[serde(default)]
    pub admin_notes: Option<String>,
    #[serde(default)]
    pub resolved_by: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<i64>,
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

impl Record for Report {
    const COLLECTION: &'static str = "user_reports";
}
