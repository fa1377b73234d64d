//! Short-lived memo of capture-service cache statistics

use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

use crate::models::CacheStats;

/// Memoises `cache/stats` responses per company so dashboards polling the
/// orchestrator do not each hit the capture service.
#[derive(Clone)]
pub struct StatsCacheManager {
    /// `None` key holds the service-wide aggregate.
    cache: Cache<Option<String>, CacheStats>,
}

impl StatsCacheManager {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, company_id: Option<&str>) -> Option<CacheStats> {
        let result = self.cache.get(&company_id.map(str::to_string)).await;
        if result.is_some() {
            debug!("Stats memo hit for company: {:?}", company_id);
        }
        result
    }

    pub async fn insert(&self, company_id: Option<&str>, stats: CacheStats) {
        self.cache.insert(company_id.map(str::to_string), stats).await;
        debug!("Memoised cache stats for company: {:?}", company_id);
    }

    /// Drop every memoised entry, e.g. after a project's cache was cleared.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
        debug!("Invalidated memoised cache stats");
    }
}
