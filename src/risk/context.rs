//! Assessment input, assembled fresh per request and never persisted as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::fingerprint::DeviceFingerprint;

/// Resolved geographic position of a login.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// ISO 3166 alpha-2 country code.
    pub country: String,
    pub city: String,
}

/// One historical login. Append-only on the caller's side; the assessor
/// treats the sequence as read-only and orders it as needed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
}

/// Everything the risk assessor can see about one authentication attempt.
///
/// All clock-relative checks use `timestamp`, so an assessment is fully
/// deterministic for an identical context and configuration.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SecurityContext {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub device_fingerprint: DeviceFingerprint,
    pub ip_address: String,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_location: Option<GeoLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_logins: Option<Vec<LoginHistoryEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_age_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_vpn: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_tor: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_proxy: Option<bool>,
}
