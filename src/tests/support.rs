//! Scripted capture service used by the orchestration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::cache::fingerprint::fingerprint;
use crate::cache::freshness::CachedState;
use crate::capture::{CaptureClient, CaptureTransport};
use crate::config::{ClientConfig, Config};
use crate::error::CaptureError;
use crate::models::{
    AddressComponents, BatchItem, CacheMetadata, CacheStats, CaptureEnvelope, CaptureRequest,
    FreshnessHint,
};
use crate::orchestrator::ConditionalCaptureOrchestrator;

pub struct FakeTransport {
    stored: Mutex<HashMap<String, CacheMetadata>>,
    pipeline_failures: Mutex<HashMap<String, Option<String>>>,
    transient_capture_failures: AtomicU32,
    transient_metadata_failures: AtomicU32,
    capture_delay: Duration,
    quality: f64,
    capture_calls: AtomicUsize,
    metadata_calls: AtomicUsize,
    clear_calls: AtomicUsize,
    stats_calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: AtomicUsize,
}

/// Decrements the in-flight counter even when the call is dropped.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self {
            stored: Mutex::new(HashMap::new()),
            pipeline_failures: Mutex::new(HashMap::new()),
            transient_capture_failures: AtomicU32::new(0),
            transient_metadata_failures: AtomicU32::new(0),
            capture_delay: Duration::ZERO,
            quality: 8.5,
            capture_calls: AtomicUsize::new(0),
            metadata_calls: AtomicUsize::new(0),
            clear_calls: AtomicUsize::new(0),
            stats_calls: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: AtomicUsize::new(0),
        }
    }
}

impl FakeTransport {
    pub fn with_delay(capture_delay: Duration) -> Self {
        Self {
            capture_delay,
            ..Self::default()
        }
    }

    pub fn with_quality(quality: f64) -> Self {
        Self {
            quality,
            ..Self::default()
        }
    }

    pub fn store(&self, metadata: CacheMetadata) {
        self.stored
            .lock()
            .unwrap()
            .insert(metadata.project_id.clone(), metadata);
    }

    /// Seed a capture of `address` taken `age` ago.
    pub fn seed(&self, project_id: &str, address: &AddressComponents, age: chrono::Duration, quality: f64) {
        self.store(CacheMetadata {
            project_id: project_id.to_string(),
            address_fingerprint: Some(fingerprint(address)),
            captured_at: Some(Utc::now() - age),
            quality_score: quality,
            raw_payload: json!({"seeded": true, "projectId": project_id}),
        });
    }

    pub fn stored(&self, project_id: &str) -> Option<CacheMetadata> {
        self.stored.lock().unwrap().get(project_id).cloned()
    }

    pub fn fail_pipeline(&self, project_id: &str, message: Option<&str>) {
        self.pipeline_failures
            .lock()
            .unwrap()
            .insert(project_id.to_string(), message.map(str::to_string));
    }

    pub fn fail_next_captures(&self, count: u32) {
        self.transient_capture_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_metadata(&self, count: u32) {
        self.transient_metadata_failures.store(count, Ordering::SeqCst);
    }

    pub fn captures(&self) -> usize {
        self.capture_calls.load(Ordering::SeqCst)
    }

    pub fn metadata_lookups(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn stats_lookups(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn unavailable() -> CaptureError {
    CaptureError::Server {
        status: 503,
        body: "capture pipeline busy".to_string(),
    }
}

#[async_trait]
impl CaptureTransport for FakeTransport {
    async fn capture(&self, request: &CaptureRequest) -> Result<CaptureEnvelope, CaptureError> {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(self.in_flight.clone());
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.capture_delay.is_zero() {
            tokio::time::sleep(self.capture_delay).await;
        }

        if take_one(&self.transient_capture_failures) {
            return Err(unavailable());
        }

        let failure = self.pipeline_failures.lock().unwrap().get(&request.project_id).cloned();
        if let Some(error) = failure {
            return Ok(CaptureEnvelope {
                success: false,
                data: None,
                error,
                warnings: Vec::new(),
            });
        }

        let data = json!({
            "geocoding": {"formattedAddress": request.address.address},
            "streetView": {"panoId": format!("pano-{}", request.project_id)},
            "analytics": {
                "dataQualityScore": self.quality,
                "streetViewAvailable": true
            }
        });
        self.store(CacheMetadata {
            project_id: request.project_id.clone(),
            address_fingerprint: Some(request.address_fingerprint.clone()),
            captured_at: Some(Utc::now()),
            quality_score: self.quality,
            raw_payload: data.clone(),
        });

        Ok(CaptureEnvelope {
            success: true,
            data: Some(data),
            error: None,
            warnings: Vec::new(),
        })
    }

    async fn check(&self, project_id: &str) -> Result<FreshnessHint, CaptureError> {
        let stored = self.stored(project_id);
        Ok(FreshnessHint {
            exists: stored.is_some(),
            should_refresh: stored.is_none(),
            reason: if stored.is_some() { "fresh" } else { "first_capture" }.to_string(),
            last_updated: stored.and_then(|m| m.captured_at),
        })
    }

    async fn metadata(&self, project_id: &str) -> Result<CachedState, CaptureError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.transient_metadata_failures) {
            return Err(unavailable());
        }
        Ok(self.stored(project_id).into())
    }

    async fn clear(&self, project_id: &str) -> Result<bool, CaptureError> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.stored.lock().unwrap().remove(project_id).is_some())
    }

    async fn stats(&self, company_id: Option<&str>) -> Result<CacheStats, CaptureError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        let total = self.stored.lock().unwrap().len() as u64;
        let mut stats = CacheStats {
            total_entries: total,
            fresh_entries: total,
            ..CacheStats::default()
        };
        if let Some(company_id) = company_id {
            stats.extra.insert("companyId".into(), json!(company_id));
        }
        Ok(stats)
    }
}

pub fn test_config() -> Config {
    Config {
        client: ClientConfig {
            retry_delay: Duration::ZERO,
            ..ClientConfig::default()
        },
        ..Config::default()
    }
}

pub fn client_for(transport: Arc<FakeTransport>, config: &ClientConfig) -> CaptureClient {
    CaptureClient::new(transport, config)
}

pub fn orchestrator_for(transport: Arc<FakeTransport>) -> ConditionalCaptureOrchestrator {
    orchestrator_with_token(transport, CancellationToken::new())
}

pub fn orchestrator_with_token(
    transport: Arc<FakeTransport>,
    cancel: CancellationToken,
) -> ConditionalCaptureOrchestrator {
    let config = test_config();
    let client = client_for(transport, &config.client);
    ConditionalCaptureOrchestrator::new(client, &config, cancel)
}

pub fn address(street: &str) -> AddressComponents {
    AddressComponents::new(street, "Denver", "CO", "80202")
}

pub fn batch_items(count: usize) -> Vec<BatchItem> {
    (0..count)
        .map(|i| BatchItem {
            project_id: format!("proj-{}", i + 1),
            company_id: "acme-solar".to_string(),
            address: address(&format!("{} Larimer St", 1400 + i)),
        })
        .collect()
}

pub fn minutes(n: i64) -> chrono::Duration {
    chrono::Duration::minutes(n)
}

pub fn days(n: i64) -> chrono::Duration {
    chrono::Duration::days(n)
}
