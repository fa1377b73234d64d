//! Retry and response-unwrapping behaviour of the capture client.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::support::*;
use crate::cache::fingerprint::fingerprint;
use crate::cache::freshness::CachedState;
use crate::config::ClientConfig;
use crate::error::{CaptureError, GENERIC_CAPTURE_FAILURE};
use crate::models::CaptureRequest;

fn request(project_id: &str) -> CaptureRequest {
    let address = address("1600 Glenarm Pl");
    CaptureRequest {
        project_id: project_id.to_string(),
        company_id: "acme-solar".to_string(),
        address_fingerprint: fingerprint(&address),
        address,
    }
}

fn no_delay(retries: u32) -> ClientConfig {
    ClientConfig {
        retry_attempts: retries,
        retry_delay: Duration::ZERO,
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let transport = Arc::new(FakeTransport::default());
    transport.fail_next_captures(2);
    let client = client_for(transport.clone(), &no_delay(3));

    let result = client
        .capture(&request("p1"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.attempts, 3);
    assert_eq!(transport.captures(), 3);
    assert_eq!(result.data.analytics.data_quality_score, 8.5);
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn last_error_surfaces_after_exhausting_attempts() {
    let transport = Arc::new(FakeTransport::default());
    transport.fail_next_captures(10);
    let client = client_for(transport.clone(), &no_delay(3));

    let err = client
        .capture(&request("p1"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CaptureError::Server { status: 503, .. }));
    // First call plus three retries.
    assert_eq!(transport.captures(), 4);
}

#[tokio::test]
async fn default_budget_survives_three_transient_failures() {
    let transport = Arc::new(FakeTransport::default());
    transport.fail_next_captures(3);
    let config = ClientConfig {
        retry_delay: Duration::ZERO,
        ..ClientConfig::default()
    };
    let client = client_for(transport.clone(), &config);

    let result = client
        .capture(&request("p1"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.attempts, 4);
    assert_eq!(transport.captures(), 4);
}

#[tokio::test]
async fn zero_retries_means_a_single_call() {
    let transport = Arc::new(FakeTransport::default());
    transport.fail_next_captures(1);
    let client = client_for(transport.clone(), &no_delay(0));

    let err = client
        .capture(&request("p1"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(transport.captures(), 1);
}

#[tokio::test]
async fn pipeline_failure_is_not_retried() {
    let transport = Arc::new(FakeTransport::default());
    transport.fail_pipeline("p1", Some("Address could not be geocoded"));
    let client = client_for(transport.clone(), &no_delay(3));

    let err = client
        .capture(&request("p1"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Address could not be geocoded");
    assert_eq!(transport.captures(), 1);

    transport.fail_pipeline("p2", None);
    let err = client
        .capture(&request("p2"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), GENERIC_CAPTURE_FAILURE);
}

#[tokio::test(start_paused = true)]
async fn retry_delay_is_fixed() {
    let transport = Arc::new(FakeTransport::default());
    transport.fail_next_captures(3);
    let config = ClientConfig {
        retry_attempts: 3,
        retry_delay: Duration::from_millis(1000),
        ..ClientConfig::default()
    };
    let client = client_for(transport.clone(), &config);

    let started = Instant::now();
    let result = client
        .capture(&request("p1"), &CancellationToken::new())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result.attempts, 4);
    // Three constant pauses; exponential growth would need 7s.
    assert!(elapsed >= Duration::from_millis(3000), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(3500), "{:?}", elapsed);
}

#[tokio::test]
async fn missing_metadata_is_a_miss_not_an_error() {
    let transport = Arc::new(FakeTransport::default());
    let client = client_for(transport.clone(), &no_delay(3));

    let state = client
        .check_cache("never-captured", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(state, CachedState::Absent);
    assert_eq!(transport.metadata_lookups(), 1);
}

#[tokio::test]
async fn metadata_server_errors_stay_errors() {
    let transport = Arc::new(FakeTransport::default());
    transport.fail_next_metadata(5);
    let client = client_for(transport.clone(), &no_delay(2));

    let err = client
        .check_cache("p1", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(transport.metadata_lookups(), 3);
}

#[tokio::test]
async fn cancelled_token_stops_before_first_attempt() {
    let transport = Arc::new(FakeTransport::default());
    let client = client_for(transport.clone(), &no_delay(3));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client.capture(&request("p1"), &cancel).await.unwrap_err();
    assert!(matches!(err, CaptureError::Cancelled));
    assert_eq!(transport.captures(), 0);
}

#[tokio::test]
async fn clear_and_stats_pass_through() {
    let transport = Arc::new(FakeTransport::default());
    transport.seed("p1", &address("1 Market St"), minutes(5), 9.0);
    let client = client_for(transport.clone(), &no_delay(1));
    let cancel = CancellationToken::new();

    let stats = client.stats(Some("acme-solar"), &cancel).await.unwrap();
    assert_eq!(stats.total_entries, 1);

    assert!(client.clear_cache("p1", &cancel).await.unwrap());
    assert!(!client.clear_cache("p1", &cancel).await.unwrap());
    assert!(transport.stored("p1").is_none());

    let hint = client.check("p1", &cancel).await.unwrap();
    assert!(!hint.exists);
    assert!(hint.should_refresh);
}
