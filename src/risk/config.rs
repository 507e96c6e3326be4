//! Risk thresholds and category weights.

use super::{FactorKind, RiskLevel};

const DEFAULT_MEDIUM_THRESHOLD: u8 = 30;
const DEFAULT_HIGH_THRESHOLD: u8 = 60;
const DEFAULT_CRITICAL_THRESHOLD: u8 = 85;
const DEFAULT_BLOCK_THRESHOLD: u8 = 90;

/// Fixed category weights; they sum to 1.0.
pub(crate) mod weights {
    pub const LOCATION: f64 = 0.25;
    pub const DEVICE: f64 = 0.25;
    pub const BEHAVIOR: f64 = 0.20;
    pub const TEMPORAL: f64 = 0.15;
    pub const NETWORK: f64 = 0.15;
}

pub(crate) const fn weight_for(kind: FactorKind) -> f64 {
    match kind {
        FactorKind::Location => weights::LOCATION,
        FactorKind::Device => weights::DEVICE,
        FactorKind::Behavior => weights::BEHAVIOR,
        FactorKind::Temporal => weights::TEMPORAL,
        FactorKind::Network => weights::NETWORK,
    }
}

/// Score boundaries for classification and blocking. The boundary values are
/// calibration constants; tune them per deployment profile, not per request.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    medium_threshold: u8,
    high_threshold: u8,
    critical_threshold: u8,
    block_threshold: u8,
    mfa_always: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            medium_threshold: DEFAULT_MEDIUM_THRESHOLD,
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            critical_threshold: DEFAULT_CRITICAL_THRESHOLD,
            block_threshold: DEFAULT_BLOCK_THRESHOLD,
            mfa_always: false,
        }
    }
}

impl RiskConfig {
    /// Baseline calibration for interactive user traffic.
    #[must_use]
    pub fn standard() -> Self {
        Self::default()
    }

    /// Tighter boundaries for sensitive deployments.
    #[must_use]
    pub fn strict() -> Self {
        Self::default()
            .with_medium_threshold(25)
            .with_high_threshold(50)
            .with_critical_threshold(75)
    }

    /// Administrative surfaces: tightest boundaries, step-up always on.
    #[must_use]
    pub fn admin() -> Self {
        Self::default()
            .with_medium_threshold(20)
            .with_high_threshold(40)
            .with_critical_threshold(65)
            .with_mfa_always(true)
    }

    #[must_use]
    pub fn with_medium_threshold(mut self, threshold: u8) -> Self {
        self.medium_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_high_threshold(mut self, threshold: u8) -> Self {
        self.high_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_critical_threshold(mut self, threshold: u8) -> Self {
        self.critical_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_block_threshold(mut self, threshold: u8) -> Self {
        self.block_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_mfa_always(mut self, mfa_always: bool) -> Self {
        self.mfa_always = mfa_always;
        self
    }

    #[must_use]
    pub fn medium_threshold(&self) -> u8 {
        self.medium_threshold
    }

    #[must_use]
    pub fn high_threshold(&self) -> u8 {
        self.high_threshold
    }

    #[must_use]
    pub fn critical_threshold(&self) -> u8 {
        self.critical_threshold
    }

    #[must_use]
    pub fn block_threshold(&self) -> u8 {
        self.block_threshold
    }

    #[must_use]
    pub fn mfa_always(&self) -> bool {
        self.mfa_always
    }

    /// Classify a clamped score against the configured boundaries.
    #[must_use]
    pub fn level_for(&self, score: u8) -> RiskLevel {
        if score >= self.critical_threshold {
            RiskLevel::Critical
        } else if score >= self.high_threshold {
            RiskLevel::High
        } else if score >= self.medium_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_boundaries_classify_monotonically() {
        let config = RiskConfig::default();
        assert_eq!(config.level_for(0), RiskLevel::Low);
        assert_eq!(config.level_for(29), RiskLevel::Low);
        assert_eq!(config.level_for(30), RiskLevel::Medium);
        assert_eq!(config.level_for(59), RiskLevel::Medium);
        assert_eq!(config.level_for(60), RiskLevel::High);
        assert_eq!(config.level_for(84), RiskLevel::High);
        assert_eq!(config.level_for(85), RiskLevel::Critical);
        assert_eq!(config.level_for(100), RiskLevel::Critical);
    }

    #[test]
    fn category_weights_sum_to_one() {
        let sum = weights::LOCATION
            + weights::DEVICE
            + weights::BEHAVIOR
            + weights::TEMPORAL
            + weights::NETWORK;
        assert!((sum - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn admin_profile_forces_step_up() {
        let config = RiskConfig::admin();
        assert!(config.mfa_always());
        assert_eq!(config.level_for(20), RiskLevel::Medium);
    }

    #[test]
    fn builder_overrides_apply() {
        let config = RiskConfig::standard()
            .with_block_threshold(80)
            .with_medium_threshold(10);
        assert_eq!(config.block_threshold(), 80);
        assert_eq!(config.medium_threshold(), 10);
        assert_eq!(config.high_threshold(), DEFAULT_HIGH_THRESHOLD);
    }
}
