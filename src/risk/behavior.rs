//! Behavioral risk over the recent login history.

use chrono::{Duration, Timelike};

use super::context::SecurityContext;
use super::{FactorDetails, RiskFactor, Severity};

const HISTORY_WINDOW_DAYS: i64 = 30;
const DAILY_LOGINS_HIGH: u32 = 20;
const DAILY_LOGINS_MEDIUM: u32 = 10;
// Hour-of-day distribution is only meaningful with some history behind it.
const MIN_LOGINS_FOR_HOUR_PROFILE: usize = 10;
const UNUSUAL_HOUR_SHARE: f64 = 0.05;
const SUCCESS_RATE_HIGH: f64 = 0.5;
const SUCCESS_RATE_MEDIUM: f64 = 0.8;
const FAILED_ATTEMPTS_CAP: u32 = 90;

pub(crate) fn assess(context: &SecurityContext) -> Vec<RiskFactor> {
    let mut factors = Vec::new();

    if let Some(history) = context.previous_logins.as_deref() {
        let window: Vec<_> = history
            .iter()
            .filter(|entry| {
                entry.timestamp <= context.timestamp
                    && context.timestamp - entry.timestamp <= Duration::days(HISTORY_WINDOW_DAYS)
            })
            .collect();

        let today = context.timestamp.date_naive();
        let logins_today = u32::try_from(
            window
                .iter()
                .filter(|entry| entry.timestamp.date_naive() == today)
                .count(),
        )
        .unwrap_or(u32::MAX);
        if logins_today > DAILY_LOGINS_HIGH {
            factors.push(frequency_factor(Severity::High, 75, logins_today));
        } else if logins_today > DAILY_LOGINS_MEDIUM {
            factors.push(frequency_factor(Severity::Medium, 45, logins_today));
        }

        if window.len() >= MIN_LOGINS_FOR_HOUR_PROFILE {
            let hour = context.timestamp.hour();
            let same_hour = window
                .iter()
                .filter(|entry| entry.timestamp.hour() == hour)
                .count();
            let share = same_hour as f64 / window.len() as f64;
            if share < UNUSUAL_HOUR_SHARE {
                factors.push(RiskFactor::new(
                    Severity::Medium,
                    40,
                    format!("Unusual time of day for this account ({hour:02}:00 UTC)"),
                    FactorDetails::Behavior {
                        logins_today: None,
                        failed_attempts: None,
                        hour: Some(hour),
                        success_rate: None,
                    },
                ));
            }
        }

        if !window.is_empty() {
            let successes = window.iter().filter(|entry| entry.success).count();
            let rate = successes as f64 / window.len() as f64;
            if rate < SUCCESS_RATE_HIGH {
                factors.push(success_rate_factor(Severity::High, 70, rate));
            } else if rate < SUCCESS_RATE_MEDIUM {
                factors.push(success_rate_factor(Severity::Medium, 45, rate));
            }
        }
    }

    if let Some(attempts) = context.failed_attempts.filter(|attempts| *attempts > 0) {
        let score = FAILED_ATTEMPTS_CAP.min(20 + 10 * attempts);
        let severity = if attempts > 5 {
            Severity::High
        } else if attempts > 2 {
            Severity::Medium
        } else {
            Severity::Low
        };
        factors.push(RiskFactor::new(
            severity,
            u8::try_from(score).unwrap_or(u8::MAX),
            format!("{attempts} recent failed authentication attempts"),
            FactorDetails::Behavior {
                logins_today: None,
                failed_attempts: Some(attempts),
                hour: None,
                success_rate: None,
            },
        ));
    }

    factors
}

fn frequency_factor(severity: Severity, score: u8, logins_today: u32) -> RiskFactor {
    RiskFactor::new(
        severity,
        score,
        format!("{logins_today} logins today"),
        FactorDetails::Behavior {
            logins_today: Some(logins_today),
            failed_attempts: None,
            hour: None,
            success_rate: None,
        },
    )
}

fn success_rate_factor(severity: Severity, score: u8, rate: f64) -> RiskFactor {
    RiskFactor::new(
        severity,
        score,
        format!("Login success rate {:.0}% over the last 30 days", rate * 100.0),
        FactorDetails::Behavior {
            logins_today: None,
            failed_attempts: None,
            hour: None,
            success_rate: Some(rate),
        },
    )
}
