use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::transport::{CaptureTransport, HttpTransport};
use crate::cache::freshness::{CachedState, MAX_QUALITY_SCORE};
use crate::config::ClientConfig;
use crate::error::CaptureError;
use crate::models::{CacheStats, CaptureData, CaptureRequest, CaptureResult, FreshnessHint};

/// Stateless wrapper over a [`CaptureTransport`] adding fixed-delay retry
/// for transport failures.
#[derive(Clone)]
pub struct CaptureClient {
    transport: Arc<dyn CaptureTransport>,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl CaptureClient {
    pub fn new(transport: Arc<dyn CaptureTransport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            retry_attempts: config.retry_attempts,
            retry_delay: config.retry_delay,
        }
    }

    /// Client backed by the HTTP capture service.
    pub fn from_config(config: &ClientConfig) -> Result<Self, CaptureError> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    /// Run `call` until it succeeds, fails permanently, or `retry_attempts`
    /// retries are spent. Returns the value and the attempts used.
    async fn with_retry<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<(T, u32), CaptureError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CaptureError>>,
    {
        let attempts = AtomicU32::new(0);
        let backoff = ConstantBuilder::default()
            .with_delay(self.retry_delay)
            .with_max_times(self.retry_attempts as usize);

        let value = (|| {
            let attempts = &attempts;
            let call = &call;
            async move {
                if cancel.is_cancelled() {
                    return Err(CaptureError::Cancelled);
                }
                attempts.fetch_add(1, Ordering::Relaxed);
                call().await
            }
        })
        .retry(backoff)
        .when(|e: &CaptureError| e.is_transient())
        .notify(|e: &CaptureError, delay: Duration| {
            warn!("{} failed, retrying in {:?}: {}", operation, delay, e);
        })
        .await?;

        Ok((value, attempts.load(Ordering::Relaxed)))
    }

    /// Perform one capture. A pipeline-level `success: false` is returned as
    /// [`CaptureError::Pipeline`] without retrying.
    pub async fn capture(
        &self,
        request: &CaptureRequest,
        cancel: &CancellationToken,
    ) -> Result<CaptureResult, CaptureError> {
        let started = Instant::now();
        let (envelope, attempts) = self
            .with_retry("capture", cancel, || self.transport.capture(request))
            .await?;

        if !envelope.success {
            warn!(
                "Capture pipeline reported failure for project {}: {:?}",
                request.project_id, envelope.error
            );
            return Err(CaptureError::pipeline(envelope.error));
        }

        let raw = envelope
            .data
            .ok_or_else(|| CaptureError::pipeline(Some("capture response contained no data".into())))?;
        let data: CaptureData = serde_json::from_value(raw.clone())?;

        let mut warnings = envelope.warnings;
        warnings.extend(derived_warnings(&data));

        let processing_time_ms = started.elapsed().as_millis() as u64;
        info!(
            "Captured project {} in {}ms ({} attempt(s), quality {})",
            request.project_id, processing_time_ms, attempts, data.analytics.data_quality_score
        );

        Ok(CaptureResult {
            data,
            raw,
            processing_time_ms,
            attempts,
            warnings,
        })
    }

    /// Load stored metadata. A missing entry is `Ok(CachedState::Absent)`,
    /// never an error.
    pub async fn check_cache(
        &self,
        project_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CachedState, CaptureError> {
        let (state, _) = self
            .with_retry("metadata lookup", cancel, || self.transport.metadata(project_id))
            .await?;
        if matches!(state, CachedState::Absent) {
            debug!("Cache miss for project {}", project_id);
        }
        Ok(state)
    }

    /// Server-side freshness verdict, cheaper than a metadata fetch.
    pub async fn check(
        &self,
        project_id: &str,
        cancel: &CancellationToken,
    ) -> Result<FreshnessHint, CaptureError> {
        let (hint, _) = self
            .with_retry("freshness check", cancel, || self.transport.check(project_id))
            .await?;
        Ok(hint)
    }

    pub async fn clear_cache(
        &self,
        project_id: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, CaptureError> {
        let (cleared, _) = self
            .with_retry("cache clear", cancel, || self.transport.clear(project_id))
            .await?;
        info!("Cleared cached capture for project {}: {}", project_id, cleared);
        Ok(cleared)
    }

    pub async fn stats(
        &self,
        company_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<CacheStats, CaptureError> {
        let (stats, _) = self
            .with_retry("stats lookup", cancel, || self.transport.stats(company_id))
            .await?;
        Ok(stats)
    }
}

fn derived_warnings(data: &CaptureData) -> Vec<String> {
    let mut warnings = Vec::new();
    if !data.analytics.street_view_available {
        warnings.push("Street view imagery is not available for this address".to_string());
    }
    let score = data.analytics.data_quality_score;
    if !(0.0..=MAX_QUALITY_SCORE).contains(&score) {
        warnings.push(format!("Data quality score {} is outside 0-10", score));
    }
    warnings
}
