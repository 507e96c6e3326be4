//! Location and travel-velocity risk.

use std::collections::BTreeSet;

use chrono::Duration;

use super::context::{GeoLocation, LoginHistoryEntry, SecurityContext};
use super::{FactorDetails, RiskFactor, Severity};

const EARTH_RADIUS_KM: f64 = 6371.0;
pub(crate) const IMPOSSIBLE_TRAVEL_KMH: f64 = 1000.0;
const FAST_TRAVEL_KMH: f64 = 500.0;
const TRAVEL_WINDOW_HOURS: i64 = 24;
// Near-simultaneous logins would otherwise divide by zero.
const MIN_ELAPSED_HOURS: f64 = 1.0 / 3600.0;

/// Countries that always raise a high factor, by ISO 3166 alpha-2 code.
const HIGH_RISK_COUNTRIES: [&str; 5] = ["KP", "IR", "SY", "SD", "CU"];

/// Runs whenever the context carries a resolved location. An absent or
/// unlocated history yields the first-login factor and nothing else.
pub(crate) fn assess(context: &SecurityContext) -> Vec<RiskFactor> {
    let Some(current) = &context.geo_location else {
        return Vec::new();
    };
    let history = context.previous_logins.as_deref().unwrap_or_default();
    let located: Vec<&LoginHistoryEntry> = history
        .iter()
        .filter(|entry| entry.location.is_some())
        .collect();

    if located.is_empty() {
        return vec![RiskFactor::new(
            Severity::Medium,
            40,
            "First login from this location",
            FactorDetails::Location {
                distance_km: None,
                speed_kmh: None,
                country: Some(current.country.clone()),
                city: Some(current.city.clone()),
            },
        )];
    }

    let mut factors = Vec::new();

    if let Some(factor) = travel_factor(context, current, &located) {
        let critical = factor.severity == Severity::Critical;
        factors.push(factor);
        if critical {
            // Impossible travel dominates the category; further location
            // signals would only dilute its weighted contribution.
            return factors;
        }
    }

    let countries: BTreeSet<&str> = located
        .iter()
        .filter_map(|entry| entry.location.as_ref())
        .map(|location| location.country.as_str())
        .collect();

    if countries.contains(current.country.as_str()) {
        let cities: BTreeSet<&str> = located
            .iter()
            .filter_map(|entry| entry.location.as_ref())
            .filter(|location| location.country == current.country)
            .map(|location| location.city.as_str())
            .collect();
        if !current.city.is_empty() && !cities.contains(current.city.as_str()) {
            factors.push(RiskFactor::new(
                Severity::Medium,
                45,
                format!("First login from {}", current.city),
                FactorDetails::Location {
                    distance_km: None,
                    speed_kmh: None,
                    country: Some(current.country.clone()),
                    city: Some(current.city.clone()),
                },
            ));
        }
    } else {
        factors.push(RiskFactor::new(
            Severity::Medium,
            50,
            format!("First login from country {}", current.country),
            FactorDetails::Location {
                distance_km: None,
                speed_kmh: None,
                country: Some(current.country.clone()),
                city: None,
            },
        ));
    }

    if HIGH_RISK_COUNTRIES.contains(&current.country.as_str()) {
        factors.push(RiskFactor::new(
            Severity::High,
            75,
            format!("Login from high-risk country {}", current.country),
            FactorDetails::Location {
                distance_km: None,
                speed_kmh: None,
                country: Some(current.country.clone()),
                city: None,
            },
        ));
    }

    factors
}

/// Implied travel speed against the most recent located login in the last
/// 24 hours.
fn travel_factor(
    context: &SecurityContext,
    current: &GeoLocation,
    located: &[&LoginHistoryEntry],
) -> Option<RiskFactor> {
    let window = Duration::hours(TRAVEL_WINDOW_HOURS);
    let previous = located
        .iter()
        .filter(|entry| {
            entry.timestamp <= context.timestamp && context.timestamp - entry.timestamp <= window
        })
        .max_by_key(|entry| entry.timestamp)?;
    let origin = previous.location.as_ref()?;

    let distance_km = haversine_km(origin, current);
    let elapsed_hours = ((context.timestamp - previous.timestamp).num_seconds() as f64 / 3600.0)
        .max(MIN_ELAPSED_HOURS);
    let speed_kmh = distance_km / elapsed_hours;

    let (severity, score, description) = if speed_kmh > IMPOSSIBLE_TRAVEL_KMH {
        (
            Severity::Critical,
            90,
            format!("Impossible travel: {distance_km:.0} km in {elapsed_hours:.1} h"),
        )
    } else if speed_kmh > FAST_TRAVEL_KMH {
        (
            Severity::High,
            70,
            format!("Very fast travel: {distance_km:.0} km in {elapsed_hours:.1} h"),
        )
    } else {
        return None;
    };

    Some(
        RiskFactor::new(
            severity,
            score,
            description,
            FactorDetails::Location {
                distance_km: Some(distance_km),
                speed_kmh: Some(speed_kmh),
                country: Some(current.country.clone()),
                city: Some(current.city.clone()),
            },
        )
        .with_audit(
            "origin",
            format!("{:.4},{:.4}", origin.latitude, origin.longitude),
        )
        .with_audit(
            "destination",
            format!("{:.4},{:.4}", current.latitude, current.longitude),
        ),
    )
}

/// Great-circle distance in kilometers.
fn haversine_km(from: &GeoLocation, to: &GeoLocation) -> f64 {
    let from_lat = from.latitude.to_radians();
    let to_lat = to.latitude.to_radians();
    let delta_lat = (to.latitude - from.latitude).to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + from_lat.cos() * to_lat.cos() * (delta_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::test_support::{context_with, entry, geo};
    use chrono::{TimeZone, Utc};

    fn nyc() -> GeoLocation {
        geo(40.7128, -74.0060, "US", "New York")
    }

    fn la() -> GeoLocation {
        geo(34.0522, -118.2437, "US", "Los Angeles")
    }

    fn tokyo() -> GeoLocation {
        geo(35.6762, 139.6503, "JP", "Tokyo")
    }

    #[test]
    fn haversine_nyc_to_la() {
        let distance = haversine_km(&nyc(), &la());
        assert!(
            (distance - 3944.0).abs() < 50.0,
            "expected ~3944 km, got {distance}"
        );
    }

    #[test]
    fn no_geo_location_contributes_nothing() {
        let mut context = context_with(Utc.with_ymd_and_hms(2024, 3, 6, 11, 0, 0).unwrap());
        context.geo_location = None;
        context.previous_logins = Some(vec![entry(context.timestamp, true, Some(nyc()))]);
        assert!(assess(&context).is_empty());
    }

    #[test]
    fn first_located_login_is_a_medium_factor() {
        let mut context = context_with(Utc.with_ymd_and_hms(2024, 3, 6, 11, 0, 0).unwrap());
        context.geo_location = Some(nyc());
        context.previous_logins = None;
        let factors = assess(&context);
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].severity, Severity::Medium);
        assert_eq!(factors[0].score, 40);
    }

    #[test]
    fn impossible_travel_is_critical_and_exclusive() {
        let now = Utc.with_ymd_and_hms(2024, 3, 6, 11, 0, 0).unwrap();
        let mut context = context_with(now);
        context.geo_location = Some(tokyo());
        context.previous_logins = Some(vec![entry(
            now - Duration::hours(1),
            true,
            Some(nyc()),
        )]);

        let factors = assess(&context);
        // The critical travel factor suppresses the new-country check.
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].severity, Severity::Critical);
        assert_eq!(factors[0].score, 90);
        assert!(factors[0].is_hard_block());
        match &factors[0].details {
            FactorDetails::Location {
                speed_kmh: Some(speed),
                ..
            } => assert!(*speed > 1000.0),
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[test]
    fn plausible_flight_is_not_flagged() {
        let now = Utc.with_ymd_and_hms(2024, 3, 6, 18, 0, 0).unwrap();
        let mut context = context_with(now);
        context.geo_location = Some(la());
        context.previous_logins = Some(vec![entry(
            now - Duration::hours(8),
            true,
            Some(nyc()),
        )]);

        let factors = assess(&context);
        assert!(
            factors.iter().all(|factor| factor.score < 70),
            "no travel factor expected: {factors:?}"
        );
    }

    #[test]
    fn fast_travel_is_high_but_not_exclusive() {
        let now = Utc.with_ymd_and_hms(2024, 3, 6, 18, 0, 0).unwrap();
        let mut context = context_with(now);
        context.geo_location = Some(la());
        context.previous_logins = Some(vec![entry(
            now - Duration::hours(4),
            true,
            Some(nyc()),
        )]);

        let factors = assess(&context);
        assert!(factors
            .iter()
            .any(|factor| factor.severity == Severity::High && factor.score == 70));
    }

    #[test]
    fn new_country_and_high_risk_country_stack() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 11, 0, 0).unwrap();
        let mut context = context_with(now);
        context.geo_location = Some(geo(39.0392, 125.7625, "KP", "Pyongyang"));
        context.previous_logins = Some(vec![entry(
            now - Duration::days(3),
            true,
            Some(nyc()),
        )]);

        let factors = assess(&context);
        assert!(factors.iter().any(|factor| factor.score == 50));
        assert!(factors.iter().any(|factor| factor.score == 75));
    }

    #[test]
    fn unseen_city_in_known_country_is_medium() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 11, 0, 0).unwrap();
        let mut context = context_with(now);
        context.geo_location = Some(la());
        context.previous_logins = Some(vec![entry(
            now - Duration::days(3),
            true,
            Some(nyc()),
        )]);

        let factors = assess(&context);
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].score, 45);
    }
}
