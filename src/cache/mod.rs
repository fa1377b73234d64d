pub mod fingerprint;
pub mod freshness;
pub mod inflight;
pub mod keys;
pub mod stats;

pub use fingerprint::{fingerprint, AddressFingerprint};
pub use freshness::{evaluate, evaluate_at, CacheStatus, CachedState, StalenessPolicy, StalenessReason};
pub use inflight::InFlight;
pub use keys::{CaptureKey, FetchKey, FetchMode};
pub use stats::StatsCacheManager;
