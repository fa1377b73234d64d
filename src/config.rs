// Configuration for the capture service:
// - Capture pipeline endpoint, timeout and retry budget
// - Freshness policy (max age, quality floor, address-change handling)
// - Batch pacing (window size, inter-window delay)
// - Stats memo TTL

use dotenv::dotenv;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::cache::freshness::StalenessPolicy;

/// Hard ceiling on concurrent captures in a batch window.
pub const MAX_BATCH_CONCURRENCY: usize = 2;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Malformed {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Retries after the first call when it fails transiently; 0 disables retry.
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            timeout: Duration::from_secs(30),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        reqwest::Url::parse(&self.base_url).map_err(|e| ConfigError::Malformed {
            name: "CAPTURE_API_URL",
            value: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchPolicy {
    pub concurrency: usize,
    pub inter_window_delay: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            concurrency: MAX_BATCH_CONCURRENCY,
            inter_window_delay: Duration::from_millis(2000),
        }
    }
}

impl BatchPolicy {
    /// Clamp a requested window size into `1..=min(self.concurrency, ceiling)`.
    pub fn effective_concurrency(&self, requested: usize) -> usize {
        requested
            .min(self.concurrency)
            .min(MAX_BATCH_CONCURRENCY)
            .max(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "BATCH_CONCURRENCY",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub client: ClientConfig,
    pub staleness: StalenessPolicy,
    pub batch: BatchPolicy,
    pub stats_cache_ttl: Duration,
    pub stats_cache_capacity: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            staleness: StalenessPolicy::default(),
            batch: BatchPolicy::default(),
            stats_cache_ttl: Duration::from_secs(60),
            stats_cache_capacity: 1000,
        }
    }
}

/// Read `name`, falling back to `default` when unset. A set but unparseable
/// value is an error rather than a silent default.
fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Malformed {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        let defaults = Config::default();

        let base_url = env::var("CAPTURE_API_URL").unwrap_or(defaults.client.base_url);
        let timeout = parse_var("CAPTURE_TIMEOUT_SECS", 30).map(Duration::from_secs)?;
        let retry_attempts = parse_var("CAPTURE_RETRY_ATTEMPTS", defaults.client.retry_attempts)?;
        let retry_delay = parse_var("CAPTURE_RETRY_DELAY_MS", 1000).map(Duration::from_millis)?;

        let max_age = parse_var("CACHE_MAX_AGE_HOURS", 720)
            .map(|hours: u64| Duration::from_secs(hours.saturating_mul(3600)))?;
        let min_acceptable_quality_score = parse_var(
            "CACHE_MIN_QUALITY_SCORE",
            defaults.staleness.min_acceptable_quality_score,
        )?;
        let treat_address_change_as_stale = parse_var(
            "CACHE_ADDRESS_CHANGE_STALE",
            defaults.staleness.treat_address_change_as_stale,
        )?;

        let concurrency = parse_var("BATCH_CONCURRENCY", defaults.batch.concurrency)?;
        let inter_window_delay = parse_var("BATCH_DELAY_MS", 2000).map(Duration::from_millis)?;

        let stats_cache_ttl = parse_var("STATS_CACHE_TTL_SECS", 60).map(Duration::from_secs)?;

        let config = Self {
            client: ClientConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                timeout,
                retry_attempts,
                retry_delay,
            },
            staleness: StalenessPolicy {
                max_age,
                min_acceptable_quality_score,
                treat_address_change_as_stale,
            },
            batch: BatchPolicy {
                concurrency,
                inter_window_delay,
            },
            stats_cache_ttl,
            stats_cache_capacity: defaults.stats_cache_capacity,
        };
        config.validate()?;

        info!(
            "Configuration loaded: capture endpoint {}, {} retries, max age {:?}",
            config.client.base_url, config.client.retry_attempts, config.staleness.max_age
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.client.validate()?;
        self.staleness.validate()?;
        self.batch.validate()?;
        Ok(())
    }
}
