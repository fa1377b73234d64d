use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::conditional::ConditionalCaptureOrchestrator;
use crate::config::BatchPolicy;
use crate::error::CaptureFailure;
use crate::models::{BatchItem, BatchItemResult, BatchResult, ConditionalCaptureResponse};

/// Runs conditional captures for many projects in fixed-size windows with
/// a pause between windows, so the capture pipeline sees bounded load.
#[derive(Clone)]
pub struct BatchOrchestrator {
    orchestrator: ConditionalCaptureOrchestrator,
    policy: BatchPolicy,
}

impl BatchOrchestrator {
    pub fn new(orchestrator: ConditionalCaptureOrchestrator, policy: BatchPolicy) -> Self {
        Self {
            orchestrator,
            policy,
        }
    }

    /// Capture every item, serving fresh cached data where possible.
    pub async fn batch_capture(&self, items: Vec<BatchItem>, concurrency: usize) -> BatchResult {
        let cancel = self.orchestrator.cancellation_token().child_token();
        self.run(items, concurrency, false, &cancel).await
    }

    /// [`batch_capture`](Self::batch_capture) stopping once `cancel` fires.
    /// Items not yet finished are reported as cancelled; the orchestrator
    /// stays usable for later calls.
    pub async fn batch_capture_cancellable(
        &self,
        items: Vec<BatchItem>,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> BatchResult {
        self.run(items, concurrency, false, cancel).await
    }

    /// Re-capture every item regardless of cache state.
    pub async fn batch_refresh(&self, items: Vec<BatchItem>, concurrency: usize) -> BatchResult {
        let cancel = self.orchestrator.cancellation_token().child_token();
        self.run(items, concurrency, true, &cancel).await
    }

    async fn run(
        &self,
        items: Vec<BatchItem>,
        concurrency: usize,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> BatchResult {
        let started = Instant::now();
        let total_projects = items.len();
        let window = self.policy.effective_concurrency(concurrency);
        if window < concurrency {
            debug!("Requested concurrency {} clamped to {}", concurrency, window);
        }
        info!(
            "Starting batch capture of {} projects, {} at a time",
            total_projects, window
        );

        let shutdown = self.orchestrator.cancellation_token().clone();
        let mut results = Vec::with_capacity(total_projects);

        for (index, chunk) in items.chunks(window).enumerate() {
            if index > 0 {
                tokio::select! {
                    _ = sleep(self.policy.inter_window_delay) => {}
                    _ = cancel.cancelled() => {}
                    _ = shutdown.cancelled() => {}
                }
            }

            if cancel.is_cancelled() || shutdown.is_cancelled() {
                debug!("Batch cancelled, skipping {} queued project(s)", chunk.len());
                results.extend(chunk.iter().map(|item| BatchItemResult {
                    project_id: item.project_id.clone(),
                    response: ConditionalCaptureResponse::failed(CaptureFailure::cancelled()),
                }));
                continue;
            }

            debug!("Processing batch window {} ({} projects)", index + 1, chunk.len());
            let handles: Vec<_> = chunk
                .iter()
                .cloned()
                .map(|item| {
                    let orchestrator = self.orchestrator.clone();
                    let cancel = cancel.clone();
                    let project_id = item.project_id.clone();
                    let handle = tokio::spawn(async move {
                        orchestrator
                            .conditional_capture_cancellable(
                                &item.project_id,
                                &item.company_id,
                                &item.address,
                                force_refresh,
                                &cancel,
                            )
                            .await
                    });
                    (project_id, handle)
                })
                .collect();

            for (project_id, handle) in handles {
                let response = match handle.await {
                    Ok(response) => response,
                    Err(e) => {
                        error!("Capture task for project {} failed: {}", project_id, e);
                        ConditionalCaptureResponse::failed(CaptureFailure::internal(format!(
                            "capture task failed: {}",
                            e
                        )))
                    }
                };
                results.push(BatchItemResult {
                    project_id,
                    response,
                });
            }
        }

        let result = tally(results, started.elapsed().as_millis() as u64);
        info!(
            "Batch capture finished: {} succeeded, {} failed, {} cancelled in {}ms",
            result.successful, result.failed, result.cancelled, result.total_processing_time_ms
        );
        result
    }
}

fn tally(results: Vec<BatchItemResult>, total_processing_time_ms: u64) -> BatchResult {
    let successful = results.iter().filter(|r| r.response.success).count();
    let cancelled = results.iter().filter(|r| r.response.is_cancelled()).count();
    let failed = results.len() - successful - cancelled;

    BatchResult {
        total_projects: results.len(),
        successful,
        failed,
        cancelled,
        results,
        total_processing_time_ms,
    }
}
