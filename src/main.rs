// Load configuration
// Set up logging
// Read batch items from stdin
// Run the batch with Ctrl-C wired to cancellation
// Print the batch result

use std::io::Read;

use smart_capture_service::{BatchItem, BatchOrchestrator, ConditionalCaptureOrchestrator, Config};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting smart-capture-service");

    // Configuration errors are fatal.
    let config = Config::from_env()?;

    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let items: Vec<BatchItem> = serde_json::from_str(&input)?;
    tracing::info!("Read {} batch items", items.len());

    let shutdown = CancellationToken::new();
    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling batch");
            ctrl_c_token.cancel();
        }
    });

    let orchestrator = ConditionalCaptureOrchestrator::from_config(&config, shutdown)?;
    let batch = BatchOrchestrator::new(orchestrator.clone(), config.batch.clone());
    let result = batch.batch_capture(items, config.batch.concurrency).await;

    println!("{}", serde_json::to_string_pretty(&result)?);

    let metrics = orchestrator.metrics();
    tracing::info!(
        "Cache hits: {}, misses: {}, API calls saved: {}, hit rate {:.0}%",
        metrics.cache_hits,
        metrics.cache_misses,
        metrics.api_calls_saved,
        metrics.hit_rate() * 100.0
    );

    Ok(())
}
