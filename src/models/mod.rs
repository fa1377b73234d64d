//! Wire types for the capture pipeline and the values passed between
//! orchestrators and their callers.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::cache::fingerprint::AddressFingerprint;
use crate::cache::freshness::CacheStatus;
use crate::error::CaptureFailure;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressComponents {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
}

impl AddressComponents {
    pub fn new(
        address: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        zip_code: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            city: city.into(),
            state: state.into(),
            zip_code: zip_code.into(),
        }
    }
}

/// Last known capture for a project, as stored by the capture service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    pub project_id: String,
    #[serde(default)]
    pub address_fingerprint: Option<AddressFingerprint>,
    /// `None` when the stored timestamp is missing or unparseable.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub quality_score: f64,
    #[serde(default)]
    pub raw_payload: Value,
}

/// Accepts RFC 3339 strings or epoch milliseconds; anything else becomes `None`.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok(),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub project_id: String,
    pub company_id: String,
    pub address: AddressComponents,
    pub address_fingerprint: AddressFingerprint,
}

/// Envelope returned by `POST /analytics/streetview/capture`.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureData {
    #[serde(default)]
    pub geocoding: Value,
    #[serde(default)]
    pub street_view: Value,
    pub analytics: CaptureAnalytics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureAnalytics {
    pub data_quality_score: f64,
    pub street_view_available: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Successful outcome of one capture call.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub data: CaptureData,
    /// The `data` object exactly as the pipeline returned it.
    pub raw: Value,
    pub processing_time_ms: u64,
    pub attempts: u32,
    pub warnings: Vec<String>,
}

/// Server-computed freshness verdict from `GET /analytics/streetview/check/{id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreshnessHint {
    pub exists: bool,
    pub should_refresh: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Aggregate statistics from `GET /analytics/streetview/cache/stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    #[serde(default)]
    pub total_entries: u64,
    #[serde(default)]
    pub fresh_entries: u64,
    #[serde(default)]
    pub stale_entries: u64,
    #[serde(default)]
    pub average_quality_score: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    Cached,
    FreshApi,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalCaptureResponse {
    pub success: bool,
    pub cached: bool,
    pub data_age_ms: Option<i64>,
    pub source: Option<CaptureSource>,
    pub data: Option<Value>,
    /// The metadata served, or the metadata that replaced it after a fetch.
    pub metadata: Option<CacheMetadata>,
    pub status: Option<CacheStatus>,
    pub warnings: Vec<String>,
    pub error: Option<CaptureFailure>,
}

impl ConditionalCaptureResponse {
    pub fn from_cache(metadata: CacheMetadata, status: CacheStatus, data_age_ms: Option<i64>) -> Self {
        Self {
            success: true,
            cached: true,
            data_age_ms,
            source: Some(CaptureSource::Cached),
            data: Some(metadata.raw_payload.clone()),
            metadata: Some(metadata),
            status: Some(status),
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn from_fetch(result: CaptureResult, metadata: CacheMetadata, status: CacheStatus) -> Self {
        Self {
            success: true,
            cached: false,
            data_age_ms: Some(0),
            source: Some(CaptureSource::FreshApi),
            data: Some(result.raw),
            metadata: Some(metadata),
            status: Some(status),
            warnings: result.warnings,
            error: None,
        }
    }

    pub fn failed(error: CaptureFailure) -> Self {
        Self {
            success: false,
            cached: false,
            data_age_ms: None,
            source: None,
            data: None,
            metadata: None,
            status: None,
            warnings: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(CaptureFailure::is_cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub project_id: String,
    pub company_id: String,
    pub address: AddressComponents,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub project_id: String,
    #[serde(flatten)]
    pub response: ConditionalCaptureResponse,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub total_projects: usize,
    pub successful: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub results: Vec<BatchItemResult>,
    pub total_processing_time_ms: u64,
}
