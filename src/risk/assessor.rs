//! Combines the category sub-assessments into one weighted decision.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::config::{RiskConfig, weight_for};
use super::context::SecurityContext;
use super::threat::ThreatFeed;
use super::{FactorKind, RiskAssessment, RiskFactor, RiskLevel, Severity, behavior, device,
    location, network, temporal};

/// Stateless assessment engine. Deterministic for an identical context,
/// configuration, and threat-feed contents; never errors on malformed input,
/// it skips what it cannot read.
pub struct RiskAssessor {
    config: RiskConfig,
    threat_feed: Arc<dyn ThreatFeed>,
}

impl RiskAssessor {
    #[must_use]
    pub fn new(config: RiskConfig, threat_feed: Arc<dyn ThreatFeed>) -> Self {
        Self {
            config,
            threat_feed,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Run every applicable sub-assessment and derive the policy flags.
    #[must_use]
    pub fn assess(&self, context: &SecurityContext) -> RiskAssessment {
        let mut factors = Vec::new();
        factors.extend(location::assess(context));
        factors.extend(device::assess(context));
        factors.extend(behavior::assess(context));
        factors.extend(temporal::assess(context));
        factors.extend(network::assess(context, self.threat_feed.as_ref()));

        let overall_score = weighted_score(&factors);
        let level = self.config.level_for(overall_score);

        let critical_count = factors
            .iter()
            .filter(|factor| factor.severity == Severity::Critical)
            .count();
        let high_count = factors
            .iter()
            .filter(|factor| factor.severity == Severity::High)
            .count();

        let requires_mfa = self.config.mfa_always()
            || overall_score >= self.config.medium_threshold()
            || critical_count >= 1
            || high_count >= 2;

        let allow_access = overall_score < self.config.block_threshold()
            && critical_count < 2
            && !factors.iter().any(RiskFactor::is_hard_block);

        let recommendations = recommendations(level, &factors);

        RiskAssessment {
            overall_score,
            level,
            factors,
            recommendations,
            requires_mfa,
            allow_access,
            timestamp: context.timestamp,
        }
    }
}

/// Arithmetic mean per category, scaled by the fixed category weight,
/// summed and clamped to [0, 100].
fn weighted_score(factors: &[RiskFactor]) -> u8 {
    let mut total = 0.0_f64;
    for kind in FactorKind::ALL {
        let scores: Vec<f64> = factors
            .iter()
            .filter(|factor| factor.kind() == kind)
            .map(|factor| f64::from(factor.score))
            .collect();
        if scores.is_empty() {
            continue;
        }
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        total += mean * weight_for(kind);
    }
    total.round().clamp(0.0, 100.0) as u8
}

fn recommendations(level: RiskLevel, factors: &[RiskFactor]) -> Vec<String> {
    let mut recommendations = vec![
        match level {
            RiskLevel::Critical => "Block access until identity is verified through a secondary channel",
            RiskLevel::High => "Require step-up authentication before granting access",
            RiskLevel::Medium => "Monitor this session for anomalous activity",
            RiskLevel::Low => "Allow access under standard monitoring",
        }
        .to_string(),
    ];

    let kinds: BTreeSet<FactorKind> = factors.iter().map(RiskFactor::kind).collect();
    for kind in kinds {
        recommendations.push(
            match kind {
                FactorKind::Location => "Verify the login location through a secondary channel",
                FactorKind::Device => "Request device verification or re-registration",
                FactorKind::Behavior => "Review recent account activity with the account owner",
                FactorKind::Temporal => "Confirm the activity window with the account owner",
                FactorKind::Network => {
                    "Verify the client network is not an anonymizing proxy or known threat source"
                }
            }
            .to_string(),
        );
    }

    recommendations
}
