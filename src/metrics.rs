//! Process-local counters for cache effectiveness.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub api_calls_saved: u64,
    pub total_checks: u64,
    /// Running mean of freshness-check latency, in milliseconds.
    pub average_check_time: f64,
    pub last_reset_date: DateTime<Utc>,
}

impl PerformanceMetrics {
    fn zeroed(now: DateTime<Utc>) -> Self {
        Self {
            cache_hits: 0,
            cache_misses: 0,
            api_calls_saved: 0,
            total_checks: 0,
            average_check_time: 0.0,
            last_reset_date: now,
        }
    }

    /// Share of decisions served from cache, 0.0 when nothing was decided yet.
    pub fn hit_rate(&self) -> f64 {
        let decisions = self.cache_hits + self.cache_misses;
        if decisions == 0 {
            0.0
        } else {
            self.cache_hits as f64 / decisions as f64
        }
    }
}

/// Monotonic counters between resets. Never suspends.
#[derive(Debug)]
pub struct PerformanceTracker {
    metrics: Mutex<PerformanceMetrics>,
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self {
            metrics: Mutex::new(PerformanceMetrics::zeroed(Utc::now())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PerformanceMetrics> {
        // Counters stay usable even if a holder panicked mid-update.
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A decision served from cache; each one is an avoided capture call.
    pub fn record_hit(&self) {
        let mut metrics = self.lock();
        metrics.cache_hits += 1;
        metrics.api_calls_saved += 1;
    }

    pub fn record_miss(&self) {
        self.lock().cache_misses += 1;
    }

    pub fn record_check(&self, duration: Duration) {
        let sample = duration.as_secs_f64() * 1000.0;
        let mut metrics = self.lock();
        metrics.total_checks += 1;
        let n = metrics.total_checks as f64;
        metrics.average_check_time = (metrics.average_check_time * (n - 1.0) + sample) / n;
    }

    pub fn reset(&self) {
        *self.lock() = PerformanceMetrics::zeroed(Utc::now());
    }

    pub fn snapshot(&self) -> PerformanceMetrics {
        self.lock().clone()
    }
}
