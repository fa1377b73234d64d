//! User-facing refresh recommendations.
//!
//! Freshness evaluation answers "is this stale"; this module decides what
//! to tell the user about it. Wording can change here without touching
//! the evaluator.

use serde::Serialize;

use crate::cache::freshness::{CacheStatus, StalenessPolicy, StalenessReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRecommendation {
    pub should_refresh: bool,
    pub urgency: Urgency,
    pub reason_text: String,
}

pub fn recommend(status: &CacheStatus, policy: &StalenessPolicy) -> RefreshRecommendation {
    let (urgency, reason_text) = match status.reason {
        StalenessReason::FirstCapture => (
            Urgency::High,
            "No street view data has been captured for this project yet".to_string(),
        ),
        StalenessReason::AddressChanged => (
            Urgency::High,
            "The project address has changed since the last capture".to_string(),
        ),
        StalenessReason::Expired => (Urgency::Medium, expired_text(status, policy)),
        StalenessReason::LowQuality => {
            let score = status
                .cached
                .as_ref()
                .map(|m| m.quality_score)
                .filter(|s| s.is_finite());
            let text = match score {
                Some(score) => format!(
                    "The captured data quality ({:.1}/10) is below the acceptable minimum of {:.1}",
                    score, policy.min_acceptable_quality_score
                ),
                None => "The captured data quality could not be determined".to_string(),
            };
            (Urgency::Low, text)
        }
        StalenessReason::Fresh => (Urgency::None, fresh_text(status)),
    };

    RefreshRecommendation {
        should_refresh: status.recommend_refresh,
        urgency,
        reason_text,
    }
}

fn expired_text(status: &CacheStatus, policy: &StalenessPolicy) -> String {
    let limit = describe_age(i64::try_from(policy.max_age.as_millis()).unwrap_or(i64::MAX));
    match status.age_ms {
        Some(age_ms) => format!(
            "The captured data is {} old, exceeding the {} freshness window",
            describe_age(age_ms),
            limit
        ),
        None => "The capture date of the cached data is unknown".to_string(),
    }
}

fn fresh_text(status: &CacheStatus) -> String {
    match status.age_ms {
        Some(age_ms) => format!("Cached data is up to date (captured {} ago)", describe_age(age_ms)),
        None => "Cached data is up to date".to_string(),
    }
}

fn describe_age(age_ms: i64) -> String {
    if age_ms < 60_000 {
        return format!("{} second(s)", age_ms / 1000);
    }
    let minutes = age_ms / 60_000;
    match minutes {
        m if m < 60 => format!("{} minute(s)", m),
        m if m < 60 * 24 => format!("{} hour(s)", m / 60),
        m => format!("{} day(s)", m / (60 * 24)),
    }
}
