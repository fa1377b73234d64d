use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::fingerprint::fingerprint;
use crate::cache::freshness::{evaluate, CacheStatus, CachedState, StalenessPolicy, StalenessReason};
use crate::cache::inflight::InFlight;
use crate::cache::keys::{CaptureKey, FetchKey};
use crate::cache::stats::StatsCacheManager;
use crate::capture::CaptureClient;
use crate::config::Config;
use crate::error::{CaptureError, CaptureFailure};
use crate::metrics::{PerformanceMetrics, PerformanceTracker};
use crate::models::{
    AddressComponents, CacheMetadata, CacheStats, CaptureRequest, ConditionalCaptureResponse,
    FreshnessHint,
};
use crate::recommendation::{recommend, RefreshRecommendation};
use crate::validation::{validate_capture_request, validate_project_id};

struct Inner {
    client: CaptureClient,
    policy: StalenessPolicy,
    tracker: PerformanceTracker,
    captures: InFlight<CaptureKey, ConditionalCaptureResponse>,
    fetches: InFlight<FetchKey, ConditionalCaptureResponse>,
    stats: StatsCacheManager,
    shutdown: CancellationToken,
}

/// Serves captured data from the capture service's cache when it is still
/// fresh, and re-captures otherwise.
///
/// Cheap to clone; clones share the in-flight maps, counters and shutdown
/// token.
#[derive(Clone)]
pub struct ConditionalCaptureOrchestrator {
    inner: Arc<Inner>,
}

impl ConditionalCaptureOrchestrator {
    /// Cancelling `shutdown` stops every operation on this orchestrator.
    pub fn new(client: CaptureClient, config: &Config, shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                policy: config.staleness.clone(),
                tracker: PerformanceTracker::new(),
                captures: InFlight::new(),
                fetches: InFlight::new(),
                stats: StatsCacheManager::new(config.stats_cache_capacity, config.stats_cache_ttl),
                shutdown,
            }),
        }
    }

    /// Orchestrator talking to the HTTP capture service named in `config`.
    pub fn from_config(config: &Config, shutdown: CancellationToken) -> Result<Self, CaptureError> {
        let client = CaptureClient::from_config(&config.client)?;
        Ok(Self::new(client, config, shutdown))
    }

    pub fn policy(&self) -> &StalenessPolicy {
        &self.inner.policy
    }

    /// The orchestrator-wide shutdown token. Cancel a `child_token()` of it
    /// to stop a single operation.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.inner.tracker.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.inner.tracker.reset();
    }

    /// Return cached data when fresh, otherwise capture anew.
    ///
    /// Concurrent calls for the same project, address and `force_refresh`
    /// share one underlying operation, and at most one pipeline fetch runs
    /// per project and address whatever the mode. Failures are reported in
    /// the response; a failed fetch never falls back to cached data.
    pub async fn conditional_capture(
        &self,
        project_id: &str,
        company_id: &str,
        address: &AddressComponents,
        force_refresh: bool,
    ) -> ConditionalCaptureResponse {
        let cancel = self.inner.shutdown.child_token();
        self.conditional_capture_cancellable(project_id, company_id, address, force_refresh, &cancel)
            .await
    }

    /// [`conditional_capture`](Self::conditional_capture) that gives up as
    /// soon as `cancel` fires. Other callers sharing the operation are not
    /// affected; once none remain, the pipeline call is abandoned and
    /// nothing new is recorded.
    pub async fn conditional_capture_cancellable(
        &self,
        project_id: &str,
        company_id: &str,
        address: &AddressComponents,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> ConditionalCaptureResponse {
        if let Err(e) = validate_capture_request(project_id, company_id, address) {
            warn!("Rejected capture request for project {:?}: {}", project_id, e);
            return ConditionalCaptureResponse::failed(CaptureError::from(e).into());
        }

        let address_fingerprint = fingerprint(address);
        let key = CaptureKey::new(project_id, address_fingerprint.clone(), force_refresh);
        let fetch_key = key.fetch_key();
        let request = CaptureRequest {
            project_id: project_id.to_string(),
            company_id: company_id.to_string(),
            address: address.clone(),
            address_fingerprint,
        };

        let this = self.clone();
        let shared = self.inner.captures.run(key, move || {
            async move { this.run_capture(fetch_key, request, force_refresh).await }.boxed()
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Capture for project {} cancelled by caller", project_id);
                ConditionalCaptureResponse::failed(CaptureFailure::cancelled())
            }
            response = shared => response,
        }
    }

    async fn run_capture(
        &self,
        fetch_key: FetchKey,
        request: CaptureRequest,
        force_refresh: bool,
    ) -> ConditionalCaptureResponse {
        if self.inner.shutdown.is_cancelled() {
            return ConditionalCaptureResponse::failed(CaptureFailure::cancelled());
        }

        if force_refresh {
            debug!("Forced refresh for project {}, skipping cache check", request.project_id);
        } else {
            match self.check(&request.project_id, &request.address).await {
                Ok(status) if status.is_fresh && !status.recommend_refresh => {
                    if let Some(metadata) = status.cached.clone() {
                        self.inner.tracker.record_hit();
                        debug!(
                            "Cache hit for project {} (age {:?}ms)",
                            request.project_id, status.age_ms
                        );
                        let age = status.age_ms;
                        return ConditionalCaptureResponse::from_cache(metadata, status, age);
                    }
                    self.inner.tracker.record_miss();
                }
                Ok(status) => {
                    self.inner.tracker.record_miss();
                    debug!(
                        "Refresh needed for project {}: {}",
                        request.project_id,
                        status.reason.as_str()
                    );
                }
                Err(CaptureError::Cancelled) => {
                    return ConditionalCaptureResponse::failed(CaptureFailure::cancelled());
                }
                Err(e) => {
                    // Unknown freshness is treated as stale.
                    self.inner.tracker.record_miss();
                    warn!(
                        "Cache check failed for project {}, capturing fresh: {}",
                        request.project_id, e
                    );
                }
            }
        }

        let this = self.clone();
        self.inner
            .fetches
            .run(fetch_key, move || async move { this.fetch(request).await }.boxed())
            .await
    }

    /// Capture through the pipeline and describe the new metadata.
    async fn fetch(&self, request: CaptureRequest) -> ConditionalCaptureResponse {
        let cancel = &self.inner.shutdown;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CaptureError::Cancelled),
            result = self.inner.client.capture(&request, cancel) => result,
        };

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!("Capture failed for project {}: {}", request.project_id, e);
                return ConditionalCaptureResponse::failed(e.into());
            }
        };

        // A cancelled operation must not install new metadata.
        if cancel.is_cancelled() {
            return ConditionalCaptureResponse::failed(CaptureFailure::cancelled());
        }

        let metadata = CacheMetadata {
            project_id: request.project_id.clone(),
            address_fingerprint: Some(request.address_fingerprint.clone()),
            captured_at: Some(Utc::now()),
            quality_score: result.data.analytics.data_quality_score,
            raw_payload: result.raw.clone(),
        };
        let status = evaluate(
            &request.address,
            &CachedState::Present(metadata.clone()),
            &self.inner.policy,
        );
        let below_floor = status.reason == StalenessReason::LowQuality;

        let mut response = ConditionalCaptureResponse::from_fetch(result, metadata, status);
        if below_floor {
            response.warnings.push(format!(
                "Data quality is below the acceptable minimum of {}",
                self.inner.policy.min_acceptable_quality_score
            ));
        }
        info!("Fresh capture stored for project {}", request.project_id);
        response
    }

    /// Load stored metadata and evaluate it against the current address.
    async fn check(&self, project_id: &str, address: &AddressComponents) -> Result<CacheStatus, CaptureError> {
        let cancel = &self.inner.shutdown;
        let started = Instant::now();
        let state = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CaptureError::Cancelled),
            state = self.inner.client.check_cache(project_id, cancel) => state,
        };
        let state = state?;
        let status = evaluate(address, &state, &self.inner.policy);
        self.inner.tracker.record_check(started.elapsed());
        Ok(status)
    }

    /// Freshness of the stored capture without fetching anything new.
    pub async fn cache_status(
        &self,
        project_id: &str,
        address: &AddressComponents,
    ) -> Result<CacheStatus, CaptureError> {
        validate_project_id(project_id)?;
        self.check(project_id, address).await
    }

    pub async fn recommendation(
        &self,
        project_id: &str,
        address: &AddressComponents,
    ) -> Result<RefreshRecommendation, CaptureError> {
        let status = self.cache_status(project_id, address).await?;
        Ok(recommend(&status, &self.inner.policy))
    }

    /// The capture service's own freshness verdict.
    pub async fn freshness_hint(&self, project_id: &str) -> Result<FreshnessHint, CaptureError> {
        validate_project_id(project_id)?;
        self.inner.client.check(project_id, &self.inner.shutdown).await
    }

    pub async fn clear_cache(&self, project_id: &str) -> Result<bool, CaptureError> {
        validate_project_id(project_id)?;
        let cleared = self.inner.client.clear_cache(project_id, &self.inner.shutdown).await?;
        self.inner.stats.invalidate_all();
        Ok(cleared)
    }

    /// Service-wide (or per-company) cache statistics, memoised briefly.
    pub async fn cache_stats(&self, company_id: Option<&str>) -> Result<CacheStats, CaptureError> {
        if let Some(stats) = self.inner.stats.get(company_id).await {
            return Ok(stats);
        }
        let stats = self.inner.client.stats(company_id, &self.inner.shutdown).await?;
        self.inner.stats.insert(company_id, stats.clone()).await;
        Ok(stats)
    }
}
