//! Network origin risk: anonymizers, private ranges, threat-feed hits.

use std::net::IpAddr;

use super::context::SecurityContext;
use super::threat::ThreatFeed;
use super::{FactorDetails, RiskFactor, Severity};

pub(crate) fn assess(context: &SecurityContext, feed: &dyn ThreatFeed) -> Vec<RiskFactor> {
    let mut factors = Vec::new();

    if context.is_vpn == Some(true) {
        factors.push(network_factor(
            Severity::Medium,
            50,
            "Login through a VPN exit node",
            |details| {
                if let FactorDetails::Network { vpn, .. } = details {
                    *vpn = true;
                }
            },
        ));
    }
    if context.is_tor == Some(true) {
        factors.push(network_factor(
            Severity::High,
            80,
            "Login through a Tor exit node",
            |details| {
                if let FactorDetails::Network { tor, .. } = details {
                    *tor = true;
                }
            },
        ));
    }
    if context.is_proxy == Some(true) {
        factors.push(network_factor(
            Severity::Medium,
            45,
            "Login through an open proxy",
            |details| {
                if let FactorDetails::Network { proxy, .. } = details {
                    *proxy = true;
                }
            },
        ));
    }

    // Unparseable addresses skip the address-based checks; the flags above
    // still apply.
    if let Ok(ip) = context.ip_address.parse::<IpAddr>() {
        if is_private(&ip) {
            factors.push(network_factor(
                Severity::Low,
                20,
                "Login from a private network range",
                |details| {
                    if let FactorDetails::Network {
                        private_network, ..
                    } = details
                    {
                        *private_network = true;
                    }
                },
            ));
        }
        if feed.is_known_malicious(ip) {
            factors.push(
                network_factor(
                    Severity::Critical,
                    95,
                    "IP address on the threat denylist",
                    |details| {
                        if let FactorDetails::Network {
                            known_malicious, ..
                        } = details
                        {
                            *known_malicious = true;
                        }
                    },
                )
                .with_audit("ip_address", context.ip_address.clone()),
            );
        }
    }

    factors
}

fn network_factor(
    severity: Severity,
    score: u8,
    description: &str,
    mark: impl FnOnce(&mut FactorDetails),
) -> RiskFactor {
    let mut details = FactorDetails::Network {
        vpn: false,
        tor: false,
        proxy: false,
        private_network: false,
        known_malicious: false,
    };
    mark(&mut details);
    RiskFactor::new(severity, score, description, details)
}

/// RFC 1918 ranges for v4, unique-local for v6.
fn is_private(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::test_support::context_with;
    use crate::risk::{NoopThreatFeed, StaticThreatFeed};
    use chrono::{TimeZone, Utc};

    fn clean_context() -> SecurityContext {
        context_with(Utc.with_ymd_and_hms(2024, 3, 6, 11, 0, 0).unwrap())
    }

    #[test]
    fn public_ip_without_flags_is_quiet() {
        let context = clean_context();
        assert!(assess(&context, &NoopThreatFeed).is_empty());
    }

    #[test]
    fn anonymizer_flags_stack() {
        let mut context = clean_context();
        context.is_vpn = Some(true);
        context.is_tor = Some(true);
        context.is_proxy = Some(true);
        let factors = assess(&context, &NoopThreatFeed);
        assert_eq!(factors.len(), 3);
        assert!(factors
            .iter()
            .any(|factor| factor.severity == Severity::High && factor.score == 80));
    }

    #[test]
    fn rfc1918_address_is_low() {
        let mut context = clean_context();
        context.ip_address = "10.12.0.9".to_string();
        let factors = assess(&context, &NoopThreatFeed);
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].score, 20);
    }

    #[test]
    fn unique_local_v6_is_private() {
        let mut context = clean_context();
        context.ip_address = "fd12:3456:789a::1".to_string();
        let factors = assess(&context, &NoopThreatFeed);
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].score, 20);
    }

    #[test]
    fn denylisted_ip_is_critical() {
        let mut context = clean_context();
        context.ip_address = "198.51.100.66".to_string();
        let feed = StaticThreatFeed::new(["198.51.100.66".parse().unwrap()]);
        let factors = assess(&context, &feed);
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].severity, Severity::Critical);
        assert_eq!(factors[0].score, 95);
        assert!(factors[0].is_hard_block());
    }

    #[test]
    fn unparseable_address_degrades_gracefully() {
        let mut context = clean_context();
        context.ip_address = "not-an-address".to_string();
        context.is_vpn = Some(true);
        let factors = assess(&context, &NoopThreatFeed);
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].score, 50);
    }
}
