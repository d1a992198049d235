//! Core Data Models
//!
//! The data flows through these models in the following sequence:
//!
//! 1. **Raw Data**: [`InstallRecord`] - one matching row of the inventory file
//! 2. **Aggregation**: [`UserLicenses`] - installs grouped by user with the
//!    licenses that user needs
//! 3. **Output**: [`LicenseReport`] - serializable result of a completed run

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Normalized type of a desktop machine.
pub const COMPUTER: &str = "computer";
/// Normalized type of a laptop.
pub const LAPTOP: &str = "laptop";

/// One installation of the target application.
///
/// Identity is structural: two rows describing the same computer, user and
/// type are the same install.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstallRecord {
    #[serde(rename = "computerId")]
    pub computer_id: i64,
    #[serde(rename = "userId")]
    pub user_id: i64,
    /// Trimmed and lowercased. Values other than `computer` and `laptop`
    /// are kept but never counted.
    #[serde(rename = "computerType")]
    pub computer_type: String,
}

impl InstallRecord {
    pub fn new(computer_id: i64, user_id: i64, computer_type: &str) -> Self {
        Self {
            computer_id,
            user_id,
            computer_type: normalize_computer_type(computer_type),
        }
    }

    pub fn is_computer(&self) -> bool {
        self.computer_type == COMPUTER
    }

    pub fn is_laptop(&self) -> bool {
        self.computer_type == LAPTOP
    }
}

pub fn normalize_computer_type(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Licenses needed by a single user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserLicenses {
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub computers: u64,
    pub laptops: u64,
    pub licenses: u64,
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct LicenseReport {
    #[serde(rename = "targetAppId")]
    pub target_app_id: i64,
    #[serde(rename = "totalLicenses")]
    pub total_licenses: u64,
    pub users: usize,
    pub records: usize,
    #[serde(rename = "linesScanned")]
    pub lines_scanned: u64,
    #[serde(rename = "rowsSkipped")]
    pub rows_skipped: u64,
    pub duplicates: u64,
    #[serde(rename = "appIdColumn")]
    pub app_id_column: usize,
    #[serde(rename = "headerFallback")]
    pub header_fallback: bool,
    #[serde(rename = "elapsedMs", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    #[serde(rename = "perUser", skip_serializing_if = "Option::is_none")]
    pub per_user: Option<Vec<UserLicenses>>,
}

fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
