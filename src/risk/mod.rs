//! Multi-factor risk assessment.
//!
//! Five independent sub-assessments (location, device, behavior, temporal,
//! network) each contribute zero or more typed [`RiskFactor`]s; the assessor
//! combines them into a weighted [`RiskAssessment`] with policy flags.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

mod assessor;
mod behavior;
mod config;
mod context;
mod device;
mod location;
mod network;
mod temporal;
mod threat;

pub use assessor::RiskAssessor;
pub use config::RiskConfig;
pub use context::{GeoLocation, LoginHistoryEntry, SecurityContext};
pub use threat::{
    FeedStatus, NoopThreatFeed, RemoteThreatFeed, StaticThreatFeed, ThreatFeed, spawn_refresher,
};

/// How strongly one factor signals trouble.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Overall classification of an assessment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// The five assessment categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FactorKind {
    Location,
    Device,
    Behavior,
    Temporal,
    Network,
}

impl FactorKind {
    pub(crate) const ALL: [Self; 5] = [
        Self::Location,
        Self::Device,
        Self::Behavior,
        Self::Temporal,
        Self::Network,
    ];
}

/// Category-specific fields backing a factor. One variant per category;
/// anything only useful for diagnostics goes in [`RiskFactor::audit`]
/// instead.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum FactorDetails {
    Location {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        distance_km: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speed_kmh: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        country: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        city: Option<String>,
    },
    Device {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trust_score: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        age_hours: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        automation_signature: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        missing_features: Option<u8>,
    },
    Behavior {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        logins_today: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failed_attempts: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hour: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success_rate: Option<f64>,
    },
    Temporal {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hour: Option<u32>,
        #[serde(default)]
        weekend: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account_age_days: Option<u32>,
    },
    Network {
        #[serde(default)]
        vpn: bool,
        #[serde(default)]
        tor: bool,
        #[serde(default)]
        proxy: bool,
        #[serde(default)]
        private_network: bool,
        #[serde(default)]
        known_malicious: bool,
    },
}

/// One detected signal contributing to the overall score.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RiskFactor {
    pub severity: Severity,
    /// 0-100 contribution before category weighting.
    pub score: u8,
    pub description: String,
    pub details: FactorDetails,
    /// Free-form diagnostics for audit trails; never read by policy logic.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub audit: BTreeMap<String, String>,
}

impl RiskFactor {
    pub(crate) fn new(
        severity: Severity,
        score: u8,
        description: impl Into<String>,
        details: FactorDetails,
    ) -> Self {
        Self {
            severity,
            score,
            description: description.into(),
            details,
            audit: BTreeMap::new(),
        }
    }

    #[must_use]
    pub(crate) fn with_audit(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.audit.insert(key.into(), value.into());
        self
    }

    /// Category the factor belongs to, derived from its typed details.
    #[must_use]
    pub fn kind(&self) -> FactorKind {
        match self.details {
            FactorDetails::Location { .. } => FactorKind::Location,
            FactorDetails::Device { .. } => FactorKind::Device,
            FactorDetails::Behavior { .. } => FactorKind::Behavior,
            FactorDetails::Temporal { .. } => FactorKind::Temporal,
            FactorDetails::Network { .. } => FactorKind::Network,
        }
    }

    /// Signals that deny access outright, regardless of the weighted score:
    /// a known-malicious address, impossible travel, or automation tooling.
    pub(crate) fn is_hard_block(&self) -> bool {
        match &self.details {
            FactorDetails::Network {
                known_malicious: true,
                ..
            } => true,
            FactorDetails::Location {
                speed_kmh: Some(speed),
                ..
            } => *speed > location::IMPOSSIBLE_TRAVEL_KMH,
            FactorDetails::Device {
                automation_signature: Some(_),
                ..
            } => true,
            _ => false,
        }
    }
}

/// Immutable output of one assessment run.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RiskAssessment {
    /// Weighted category sum, clamped to [0, 100].
    pub overall_score: u8,
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
    pub recommendations: Vec<String>,
    pub requires_mfa: bool,
    pub allow_access: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
