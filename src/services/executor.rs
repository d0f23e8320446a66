//! Bounded concurrent execution of command batches.

use crate::config::RunnerConfig;
use crate::domain::{Batch, BatchReport, ExecutionEvent, ExecutionResult};
use crate::error::{BatchError, BatchResult};
use crate::services::scheduler::{pool_for, Job, Wavefront, WorkerPool};
use crate::services::worker::{run_work_item, WorkerContext};
use crate::services::{CancelToken, CommandRunner};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Runs batches of work items, at most `max_concurrency` at a time
#[derive(Debug)]
pub struct BatchExecutor {
    runner: Arc<CommandRunner>,
    pool: Box<dyn WorkerPool>,
    cancel: CancelToken,
    events: Option<mpsc::UnboundedSender<ExecutionEvent>>,
}

impl BatchExecutor {
    /// Create an executor using wavefront scheduling
    pub fn new(runner: CommandRunner) -> Self {
        Self {
            runner: Arc::new(runner),
            pool: Box::new(Wavefront),
            cancel: CancelToken::never(),
            events: None,
        }
    }

    /// Create an executor from loaded configuration
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(CommandRunner::from_config(config)).with_pool(pool_for(config.executor.schedule))
    }

    /// Substitute the scheduling strategy
    pub fn with_pool(mut self, pool: Box<dyn WorkerPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Stream progress events to `tx` while running
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Run every work item and collect one result per item.
    ///
    /// Only an empty batch or a zero concurrency limit is an error; all
    /// per-item problems are reported in the returned results.
    pub async fn run(&self, batch: Batch, max_concurrency: usize) -> BatchResult<BatchReport> {
        if batch.is_empty() {
            tracing::error!("list of commands is empty");
            return Err(BatchError::EmptyBatch);
        }
        let limit =
            NonZeroUsize::new(max_concurrency).ok_or(BatchError::InvalidConcurrency(max_concurrency))?;

        let total = batch.len();
        tracing::info!(
            items = total,
            max_concurrency,
            schedule = self.pool.name(),
            "running batch"
        );

        let started = Instant::now();
        let ctx = Arc::new(WorkerContext {
            runner: Arc::clone(&self.runner),
            cancel: self.cancel.clone(),
            events: self.events.clone(),
        });
        let jobs = batch
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let ctx = Arc::clone(&ctx);
                Job::new(index, async move { run_work_item(index, item, &ctx).await })
            })
            .collect();

        let report = BatchReport::new(self.pool.execute(jobs, limit).await, started.elapsed());
        debug_assert_eq!(report.len(), total);

        tracing::info!(
            succeeded = report.succeeded_count(),
            failed = report.failure_count(),
            elapsed = ?report.elapsed(),
            "batch finished"
        );
        Ok(report)
    }
}

/// Run nested command lists with the default shell and wavefront scheduling
pub async fn submit(
    batch: Vec<Vec<String>>,
    max_concurrency: usize,
) -> BatchResult<Vec<ExecutionResult>> {
    BatchExecutor::new(CommandRunner::default())
        .run(Batch::from_commands(batch), max_concurrency)
        .await
        .map(BatchReport::into_results)
}
