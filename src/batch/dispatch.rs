use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::batch::{BatchSummary, WorkItem, WorkItemResult};

/// Workers in the pool when `--max-concurrent` isn't given
pub static DEFAULT_MAX_CONCURRENT: usize = 5;

/// Runs the whole pipeline for one work item
///
/// Implementations report failure through the returned result. A panic is also caught at the item
/// boundary and recorded as a failed result.
#[async_trait]
pub trait ItemRunner: Send + Sync + 'static {
    async fn run_item(&self, item: &WorkItem) -> WorkItemResult;
}

/// Every item's result in completion order, and the summary derived from them
pub struct BatchOutcome {
    pub results: Vec<WorkItemResult>,
    pub summary: BatchSummary,
}

/// Fixed pool of workers pulling items from a bounded queue
///
/// At most `concurrency` items are in flight at once. Items wait in the queue until a worker is
/// free; when the cancellation token fires, queued items are recorded as failed without running.
pub struct BatchDispatcher {
    runner: Arc<dyn ItemRunner>,
    concurrency: usize,
    cancel: CancellationToken,
}

impl BatchDispatcher {
    /// `concurrency` is clamped to at least one worker
    pub fn new(runner: Arc<dyn ItemRunner>, concurrency: usize, cancel: CancellationToken) -> Self {
        BatchDispatcher { runner, concurrency: concurrency.max(1), cancel }
    }

    /// Run every item and wait for all of them before summarising
    pub async fn run_batch(&self, items: Vec<WorkItem>) -> BatchOutcome {
        let total = items.len();
        info!("Dispatching {} work items across {} workers", total, self.concurrency);

        let (queue_tx, queue_rx) = mpsc::channel::<WorkItem>(self.concurrency);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<WorkItemResult>();

        let mut workers = Vec::with_capacity(self.concurrency);
        for worker_id in 0..self.concurrency.min(total.max(1)) {
            let queue = queue_rx.clone();
            let results = result_tx.clone();
            let runner = self.runner.clone();
            let cancel = self.cancel.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    // the lock is only held while waiting for the next item
                    let next = queue.lock().await.recv().await;
                    let Some(item) = next else { break };
                    let result = run_isolated(worker_id, runner.clone(), item, &cancel).await;
                    if results.send(result).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        for item in items {
            if queue_tx.send(item).await.is_err() {
                error!("Work queue closed before every item was queued");
                break;
            }
        }
        drop(queue_tx);

        for worker in futures::future::join_all(workers).await {
            if let Err(err) = worker {
                error!("Batch worker stopped unexpectedly: {err}");
            }
        }

        let mut results = Vec::with_capacity(total);
        while let Some(result) = result_rx.recv().await {
            results.push(result);
        }

        let summary = BatchSummary::from_results(&results);
        info!(
            "Batch finished: {} total, {} completed, {} failed",
            summary.total_count, summary.completed_count, summary.failed_count
        );
        BatchOutcome { results, summary }
    }
}

/// Run one item in its own task so a panic can't take the worker down with it
async fn run_isolated(worker_id: usize, runner: Arc<dyn ItemRunner>, item: WorkItem, cancel: &CancellationToken) -> WorkItemResult {
    let id = item.id.clone();
    if cancel.is_cancelled() {
        info!("[{id}] skipped, batch was cancelled");
        return WorkItemResult::failed(id, "cancelled");
    }

    info!("[{id}] started on worker {worker_id}");
    let handle = tokio::spawn(async move { runner.run_item(&item).await });
    let result = match handle.await {
        Ok(result) => result,
        Err(err) => WorkItemResult::failed(&id, format!("pipeline aborted: {err}")),
    };

    match &result.error {
        None => info!("[{id}] {:?}", result.status),
        Some(err) => error!("[{id}] error processing sample: {err}"),
    }
    result
}
