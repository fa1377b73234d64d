pub mod cache;
pub mod capture;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod recommendation;
pub mod validation;

#[cfg(test)]
mod tests;

// Re-export specific items for convenience
pub use cache::{fingerprint, AddressFingerprint, CacheStatus, CachedState, StalenessPolicy, StalenessReason};
pub use capture::{CaptureClient, CaptureTransport, HttpTransport};
pub use config::{BatchPolicy, ClientConfig, Config, ConfigError, MAX_BATCH_CONCURRENCY};
pub use error::{CaptureError, CaptureFailure, FailureKind};
pub use metrics::{PerformanceMetrics, PerformanceTracker};
pub use models::{AddressComponents, BatchItem, BatchResult, CacheMetadata, ConditionalCaptureResponse};
pub use orchestrator::{BatchOrchestrator, ConditionalCaptureOrchestrator};
pub use recommendation::{recommend, RefreshRecommendation, Urgency};
