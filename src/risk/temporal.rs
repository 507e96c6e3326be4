//! Time-of-day, weekday, and account-age risk.

use chrono::{Datelike, Timelike, Weekday};

use super::context::SecurityContext;
use super::{FactorDetails, RiskFactor, Severity};

const BUSINESS_HOURS: std::ops::Range<u32> = 9..17;
const NIGHT_WINDOW: std::ops::Range<u32> = 2..5;
const NEW_ACCOUNT_DAYS: u32 = 1;
const YOUNG_ACCOUNT_DAYS: u32 = 7;

pub(crate) fn assess(context: &SecurityContext) -> Vec<RiskFactor> {
    let mut factors = Vec::new();
    let hour = context.timestamp.hour();
    let weekday = context.timestamp.weekday();

    if weekday == Weekday::Sat || weekday == Weekday::Sun {
        factors.push(RiskFactor::new(
            Severity::Low,
            25,
            "Weekend login",
            FactorDetails::Temporal {
                hour: Some(hour),
                weekend: true,
                account_age_days: None,
            },
        ));
    }

    if !BUSINESS_HOURS.contains(&hour) {
        factors.push(RiskFactor::new(
            Severity::Low,
            20,
            format!("Login outside business hours ({hour:02}:00 UTC)"),
            FactorDetails::Temporal {
                hour: Some(hour),
                weekend: false,
                account_age_days: None,
            },
        ));
    }

    if NIGHT_WINDOW.contains(&hour) {
        factors.push(RiskFactor::new(
            Severity::Medium,
            45,
            format!("Login in the 02:00-05:00 UTC window ({hour:02}:00)"),
            FactorDetails::Temporal {
                hour: Some(hour),
                weekend: false,
                account_age_days: None,
            },
        ));
    }

    if let Some(age_days) = context.account_age_days {
        if age_days < NEW_ACCOUNT_DAYS {
            factors.push(account_age_factor(Severity::Medium, 50, age_days));
        } else if age_days < YOUNG_ACCOUNT_DAYS {
            factors.push(account_age_factor(Severity::Low, 30, age_days));
        }
    }

    factors
}

fn account_age_factor(severity: Severity, score: u8, age_days: u32) -> RiskFactor {
    RiskFactor::new(
        severity,
        score,
        format!("Account is {age_days} days old"),
        FactorDetails::Temporal {
            hour: None,
            weekend: false,
            account_age_days: Some(age_days),
        },
    )
}
