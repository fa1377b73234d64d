//! Freshness evaluation for previously captured data.
//!
//! Evaluation never fails. Anything ambiguous (missing fingerprint,
//! unparseable or future timestamp, out-of-range score) resolves toward
//! "refresh", since an extra capture is cheaper than serving stale data.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::fingerprint::fingerprint;
use crate::config::ConfigError;
use crate::models::{AddressComponents, CacheMetadata};

pub const MAX_QUALITY_SCORE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct StalenessPolicy {
    pub max_age: Duration,
    pub min_acceptable_quality_score: f64,
    pub treat_address_change_as_stale: bool,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(30 * 24 * 60 * 60),
            min_acceptable_quality_score: 5.0,
            treat_address_change_as_stale: true,
        }
    }
}

impl StalenessPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_age.is_zero() {
            return Err(ConfigError::Invalid {
                name: "CACHE_MAX_AGE_HOURS",
                reason: "must be greater than zero".to_string(),
            });
        }
        let score = self.min_acceptable_quality_score;
        if !(0.0..=MAX_QUALITY_SCORE).contains(&score) {
            return Err(ConfigError::Invalid {
                name: "CACHE_MIN_QUALITY_SCORE",
                reason: format!("{} is outside 0-{}", score, MAX_QUALITY_SCORE),
            });
        }
        Ok(())
    }

    fn max_age_ms(&self) -> i64 {
        i64::try_from(self.max_age.as_millis()).unwrap_or(i64::MAX)
    }
}

/// What storage knows about a project's last capture.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedState {
    Absent,
    Present(CacheMetadata),
}

impl From<Option<CacheMetadata>> for CachedState {
    fn from(value: Option<CacheMetadata>) -> Self {
        match value {
            Some(metadata) => CachedState::Present(metadata),
            None => CachedState::Absent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StalenessReason {
    FirstCapture,
    Expired,
    AddressChanged,
    LowQuality,
    Fresh,
}

impl StalenessReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StalenessReason::FirstCapture => "first_capture",
            StalenessReason::Expired => "expired",
            StalenessReason::AddressChanged => "address_changed",
            StalenessReason::LowQuality => "low_quality",
            StalenessReason::Fresh => "fresh",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub exists: bool,
    pub is_fresh: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub address_changed: bool,
    pub recommend_refresh: bool,
    pub reason: StalenessReason,
    pub age_ms: Option<i64>,
    #[serde(skip)]
    pub cached: Option<CacheMetadata>,
}

impl CacheStatus {
    fn first_capture() -> Self {
        Self {
            exists: false,
            is_fresh: false,
            last_updated: None,
            address_changed: false,
            recommend_refresh: true,
            reason: StalenessReason::FirstCapture,
            age_ms: None,
            cached: None,
        }
    }
}

pub fn evaluate(
    current: &AddressComponents,
    state: &CachedState,
    policy: &StalenessPolicy,
) -> CacheStatus {
    evaluate_at(current, state, policy, Utc::now())
}

/// [`evaluate`] against an explicit clock reading.
pub fn evaluate_at(
    current: &AddressComponents,
    state: &CachedState,
    policy: &StalenessPolicy,
    now: DateTime<Utc>,
) -> CacheStatus {
    let metadata = match state {
        CachedState::Absent => return CacheStatus::first_capture(),
        CachedState::Present(metadata) => metadata,
    };

    let current_fp = fingerprint(current);
    let address_changed = current_fp.is_unresolved()
        || metadata.address_fingerprint.as_ref() != Some(&current_fp);
    // An unresolved address can never be served from cache.
    let address_blocks =
        address_changed && (policy.treat_address_change_as_stale || current_fp.is_unresolved());

    let age_ms = metadata
        .captured_at
        .map(|captured| (now - captured).num_milliseconds())
        .filter(|age| *age >= 0);
    let within_age = age_ms.is_some_and(|age| age <= policy.max_age_ms());

    let score = metadata.quality_score;
    let acceptable_quality = score.is_finite()
        && score <= MAX_QUALITY_SCORE
        && score >= policy.min_acceptable_quality_score;

    let reason = if address_blocks {
        StalenessReason::AddressChanged
    } else if !within_age {
        StalenessReason::Expired
    } else if !acceptable_quality {
        StalenessReason::LowQuality
    } else {
        StalenessReason::Fresh
    };
    let is_fresh = reason == StalenessReason::Fresh;

    CacheStatus {
        exists: true,
        is_fresh,
        last_updated: metadata.captured_at,
        address_changed,
        recommend_refresh: !is_fresh,
        reason,
        age_ms,
        cached: Some(metadata.clone()),
    }
}
