//! Device trust and fingerprint-quality risk.

use chrono::Duration;

use super::context::SecurityContext;
use super::{FactorDetails, RiskFactor, Severity};
use crate::fingerprint::matches_automation_signature;

const LOW_TRUST_SCORE: u8 = 30;
const MODERATE_TRUST_SCORE: u8 = 50;
const MISSING_FEATURES_THRESHOLD: u8 = 3;

pub(crate) fn assess(context: &SecurityContext) -> Vec<RiskFactor> {
    let fingerprint = &context.device_fingerprint;

    // Automation tooling dominates the category; nothing else about the
    // device matters once the user-agent admits to being a robot.
    if let Some(signature) = matches_automation_signature(&fingerprint.user_agent) {
        return vec![RiskFactor::new(
            Severity::Critical,
            95,
            format!("Automation signature in user-agent: {signature}"),
            FactorDetails::Device {
                trust_score: Some(fingerprint.trust_score),
                age_hours: None,
                automation_signature: Some(signature.to_string()),
                missing_features: None,
            },
        )];
    }

    let mut factors = Vec::new();

    if fingerprint.trust_score < LOW_TRUST_SCORE {
        factors.push(RiskFactor::new(
            Severity::High,
            80,
            format!("Low device trust score {}", fingerprint.trust_score),
            FactorDetails::Device {
                trust_score: Some(fingerprint.trust_score),
                age_hours: None,
                automation_signature: None,
                missing_features: None,
            },
        ));
    } else if fingerprint.trust_score < MODERATE_TRUST_SCORE {
        factors.push(RiskFactor::new(
            Severity::Medium,
            50,
            format!("Moderate device trust score {}", fingerprint.trust_score),
            FactorDetails::Device {
                trust_score: Some(fingerprint.trust_score),
                age_hours: None,
                automation_signature: None,
                missing_features: None,
            },
        ));
    }

    let age_hours = (context.timestamp - fingerprint.created_at).num_hours();
    if age_hours < Duration::days(1).num_hours() {
        factors.push(RiskFactor::new(
            Severity::Medium,
            60,
            "Device fingerprint first seen within the last day",
            FactorDetails::Device {
                trust_score: None,
                age_hours: Some(age_hours),
                automation_signature: None,
                missing_features: None,
            },
        ));
    } else if age_hours < Duration::days(7).num_hours() {
        factors.push(RiskFactor::new(
            Severity::Low,
            30,
            "Device fingerprint first seen within the last week",
            FactorDetails::Device {
                trust_score: None,
                age_hours: Some(age_hours),
                automation_signature: None,
                missing_features: None,
            },
        ));
    }

    let missing = fingerprint
        .capabilities
        .as_ref()
        .map_or(4, crate::fingerprint::BrowserCapabilities::missing_count);
    if missing >= MISSING_FEATURES_THRESHOLD {
        factors.push(RiskFactor::new(
            Severity::Medium,
            55,
            format!("{missing} of 4 expected browser features missing"),
            FactorDetails::Device {
                trust_score: None,
                age_hours: None,
                automation_signature: None,
                missing_features: Some(missing),
            },
        ));
    }

    factors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::test_support::context_with;
    use chrono::{TimeZone, Utc};

    #[test]
    fn aged_trusted_device_is_quiet() {
        let context = context_with(Utc.with_ymd_and_hms(2024, 3, 6, 11, 0, 0).unwrap());
        assert!(assess(&context).is_empty());
    }

    #[test]
    fn automation_user_agent_short_circuits() {
        let mut context = context_with(Utc.with_ymd_and_hms(2024, 3, 6, 11, 0, 0).unwrap());
        context.device_fingerprint.user_agent = "Mozilla/5.0 HeadlessChrome/120.0".to_string();
        // Make the other checks eligible to prove they are skipped.
        context.device_fingerprint.trust_score = 10;
        context.device_fingerprint.created_at = context.timestamp;

        let factors = assess(&context);
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].severity, Severity::Critical);
        assert_eq!(factors[0].score, 95);
        assert!(factors[0].is_hard_block());
    }

    #[test]
    fn low_trust_is_high_severity() {
        let mut context = context_with(Utc.with_ymd_and_hms(2024, 3, 6, 11, 0, 0).unwrap());
        context.device_fingerprint.trust_score = 20;
        let factors = assess(&context);
        assert!(factors
            .iter()
            .any(|factor| factor.severity == Severity::High && factor.score == 80));
    }

    #[test]
    fn fresh_fingerprint_is_medium() {
        let mut context = context_with(Utc.with_ymd_and_hms(2024, 3, 6, 11, 0, 0).unwrap());
        context.device_fingerprint.created_at = context.timestamp - chrono::Duration::hours(2);
        let factors = assess(&context);
        assert!(factors.iter().any(|factor| factor.score == 60));
    }

    #[test]
    fn week_old_fingerprint_is_low() {
        let mut context = context_with(Utc.with_ymd_and_hms(2024, 3, 6, 11, 0, 0).unwrap());
        context.device_fingerprint.created_at = context.timestamp - chrono::Duration::days(3);
        let factors = assess(&context);
        assert!(factors.iter().any(|factor| factor.score == 30));
    }

    #[test]
    fn absent_capability_probes_count_as_missing() {
        let mut context = context_with(Utc.with_ymd_and_hms(2024, 3, 6, 11, 0, 0).unwrap());
        context.device_fingerprint.capabilities = None;
        let factors = assess(&context);
        assert!(factors.iter().any(|factor| factor.score == 55));
    }
}
