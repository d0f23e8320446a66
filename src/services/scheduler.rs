//! Worker pools that bound how many work items run at once.
//!
//! `Wavefront` runs consecutive groups and joins each group before starting
//! the next, so one slow item holds back the whole next group. `Sliding`
//! refills a slot as soon as any item finishes.

use crate::config::Schedule;
use crate::domain::{ExecutionResult, Failure, FailureKind};
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

type JobFuture = Pin<Box<dyn Future<Output = ExecutionResult> + Send + 'static>>;

/// Future returned by a pool; resolves once every job has finished
pub type PoolFuture<'a> = Pin<Box<dyn Future<Output = Vec<ExecutionResult>> + Send + 'a>>;

/// One schedulable work item
pub struct Job {
    index: usize,
    future: JobFuture,
}

impl Job {
    pub fn new<F>(index: usize, future: F) -> Self
    where
        F: Future<Output = ExecutionResult> + Send + 'static,
    {
        Self {
            index,
            future: Box::pin(future),
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("index", &self.index).finish()
    }
}

/// Strategy for running jobs with at most `limit` in flight.
///
/// Implementations must return exactly one result per job.
pub trait WorkerPool: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn execute(&self, jobs: Vec<Job>, limit: NonZeroUsize) -> PoolFuture<'_>;
}

/// Pool matching a configured schedule
pub fn pool_for(schedule: Schedule) -> Box<dyn WorkerPool> {
    match schedule {
        Schedule::Wavefront => Box::new(Wavefront),
        Schedule::Sliding => Box::new(Sliding),
    }
}

/// Split `len` items into consecutive groups of at most `limit`
pub fn plan_waves(len: usize, limit: NonZeroUsize) -> Vec<Range<usize>> {
    let limit = limit.get();
    (0..len)
        .step_by(limit)
        .map(|start| start..(start + limit).min(len))
        .collect()
}

/// Group-at-a-time scheduling with a join barrier between groups
#[derive(Debug, Clone, Copy, Default)]
pub struct Wavefront;

impl WorkerPool for Wavefront {
    fn name(&self) -> &'static str {
        "wavefront"
    }

    fn execute(&self, jobs: Vec<Job>, limit: NonZeroUsize) -> PoolFuture<'_> {
        Box::pin(async move {
            let waves = plan_waves(jobs.len(), limit);
            let mut results = Vec::with_capacity(jobs.len());
            let mut jobs = jobs.into_iter();

            for (number, wave) in waves.iter().enumerate() {
                tracing::debug!(
                    wave = number + 1,
                    of = waves.len(),
                    items = ?wave,
                    "starting wave"
                );
                let handles: Vec<_> = jobs.by_ref().take(wave.len()).map(spawn_job).collect();
                for handle in handles {
                    results.push(join_job(handle).await);
                }
            }
            results
        })
    }
}

/// Semaphore-bounded scheduling without group barriers
#[derive(Debug, Clone, Copy, Default)]
pub struct Sliding;

impl WorkerPool for Sliding {
    fn name(&self) -> &'static str {
        "sliding"
    }

    fn execute(&self, jobs: Vec<Job>, limit: NonZeroUsize) -> PoolFuture<'_> {
        Box::pin(async move {
            let slots = Arc::new(Semaphore::new(limit.get()));
            let mut handles = Vec::with_capacity(jobs.len());

            for job in jobs {
                // Never closed, so acquisition only waits
                let permit = Arc::clone(&slots).acquire_owned().await.ok();
                let Job { index, future } = job;
                handles.push((
                    index,
                    tokio::spawn(async move {
                        let _permit = permit;
                        future.await
                    }),
                ));
            }

            let mut results = Vec::with_capacity(handles.len());
            for handle in handles {
                results.push(join_job(handle).await);
            }
            results
        })
    }
}

fn spawn_job(job: Job) -> (usize, JoinHandle<ExecutionResult>) {
    (job.index, tokio::spawn(job.future))
}

async fn join_job((index, handle): (usize, JoinHandle<ExecutionResult>)) -> ExecutionResult {
    match handle.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(item = index, "worker task failed: {}", e);
            ExecutionResult::failed(
                index,
                Failure::new(
                    None,
                    FailureKind::WorkerPanicked {
                        message: e.to_string(),
                    },
                ),
                None,
                Duration::ZERO,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn limit(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[derive(Default)]
    struct Probe {
        running: AtomicUsize,
        peak: AtomicUsize,
        log: Mutex<Vec<(usize, &'static str)>>,
    }

    fn sleeping_jobs(probe: &Arc<Probe>, durations_ms: &[u64]) -> Vec<Job> {
        durations_ms
            .iter()
            .enumerate()
            .map(|(index, &ms)| {
                let probe = Arc::clone(probe);
                Job::new(index, async move {
                    let now = probe.running.fetch_add(1, Ordering::SeqCst) + 1;
                    probe.peak.fetch_max(now, Ordering::SeqCst);
                    probe.log.lock().unwrap().push((index, "start"));
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    probe.log.lock().unwrap().push((index, "end"));
                    probe.running.fetch_sub(1, Ordering::SeqCst);
                    ExecutionResult::succeeded(index, Duration::from_millis(ms))
                })
            })
            .collect()
    }

    #[test]
    fn test_plan_waves() {
        assert_eq!(plan_waves(5, limit(2)), vec![0..2, 2..4, 4..5]);
        assert_eq!(plan_waves(3, limit(3)), vec![0..3]);
        assert_eq!(plan_waves(2, limit(8)), vec![0..2]);
        assert!(plan_waves(0, limit(1)).is_empty());
    }

    #[test]
    fn test_pool_for_schedule() {
        assert_eq!(pool_for(Schedule::Wavefront).name(), "wavefront");
        assert_eq!(pool_for(Schedule::Sliding).name(), "sliding");
    }

    #[tokio::test]
    async fn test_wavefront_joins_each_group() {
        let probe = Arc::new(Probe::default());
        // Item 0 is slow; items 2 and 3 must still wait for it
        let jobs = sleeping_jobs(&probe, &[200, 10, 10, 10]);

        let results = Wavefront.execute(jobs, limit(2)).await;

        assert_eq!(results.len(), 4);
        assert_eq!(probe.peak.load(Ordering::SeqCst), 2);

        let log = probe.log.lock().unwrap();
        let position = |entry: (usize, &'static str)| log.iter().position(|e| *e == entry).unwrap();
        let second_wave_start = position((2, "start")).min(position((3, "start")));
        assert!(position((0, "end")) < second_wave_start);
        assert!(position((1, "end")) < second_wave_start);
    }

    #[tokio::test]
    async fn test_sliding_refills_free_slots() {
        let probe = Arc::new(Probe::default());
        let jobs = sleeping_jobs(&probe, &[300, 10, 10, 10]);

        let results = Sliding.execute(jobs, limit(2)).await;

        assert_eq!(results.len(), 4);
        assert!(probe.peak.load(Ordering::SeqCst) <= 2);

        // The short items all finish while the slow one is still running
        let log = probe.log.lock().unwrap();
        let slow_end = log.iter().position(|e| *e == (0, "end")).unwrap();
        let last_short_end = log.iter().position(|e| *e == (3, "end")).unwrap();
        assert!(last_short_end < slow_end);
    }

    async fn explode() -> ExecutionResult {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_panicking_job_still_yields_result() {
        let jobs = vec![
            Job::new(0, async { ExecutionResult::succeeded(0, Duration::ZERO) }),
            Job::new(1, explode()),
        ];

        let results = Wavefront.execute(jobs, limit(2)).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_success());
        assert_eq!(results[1].work_item_index, 1);
        assert!(matches!(
            results[1].failure().map(|f| &f.kind),
            Some(FailureKind::WorkerPanicked { .. })
        ));
    }

    #[test]
    fn test_single_slot_serializes() {
        let probe = Arc::new(Probe::default());
        let jobs = sleeping_jobs(&probe, &[5, 5, 5]);

        let results = tokio_test::block_on(Sliding.execute(jobs, limit(1)));

        assert_eq!(results.len(), 3);
        assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
    }
}
