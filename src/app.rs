//! Application layer: runs manifests one after another.

use crate::config::{RunnerConfig, Schedule};
use crate::domain::BatchReport;
use crate::error::{BatchError, ManifestError, Result};
use crate::services::{plan_waves, BatchExecutor, CancelToken, Manifest};
use std::fmt::Write as _;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Outcome of one manifest
#[derive(Debug, Clone)]
pub struct ManifestRun {
    pub path: PathBuf,
    pub max_concurrency: usize,
    pub report: BatchReport,
}

/// Main application state
#[derive(Debug)]
pub struct App {
    config: RunnerConfig,
    cancel: CancelToken,
}

impl App {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::never(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Load every manifest up front so a bad file aborts before anything runs
    pub fn load_manifests(paths: &[PathBuf]) -> Result<Vec<Manifest>> {
        let mut manifests = Vec::with_capacity(paths.len());
        for path in paths {
            let manifest = Manifest::load(path)?;
            if manifest.batch.is_empty() {
                return Err(ManifestError::Empty(path.clone()).into());
            }
            manifests.push(manifest);
        }
        Ok(manifests)
    }

    /// Command line override, then the manifest's own value, then config
    pub fn concurrency_for(&self, manifest: &Manifest, jobs: Option<NonZeroUsize>) -> usize {
        jobs.map(NonZeroUsize::get)
            .or(manifest.max_concurrency)
            .unwrap_or(self.config.executor.max_concurrency)
    }

    /// Describe what would run, without running it
    pub fn plan(&self, manifests: &[Manifest], jobs: Option<NonZeroUsize>) -> String {
        let schedule = self.config.executor.schedule;
        let mut out = String::new();

        for manifest in manifests {
            let limit = self.concurrency_for(manifest, jobs);
            let _ = writeln!(
                out,
                "{}: {} work items, max concurrency {}, {} schedule",
                manifest.path.display(),
                manifest.batch.len(),
                limit,
                schedule
            );

            let groups = match (schedule, NonZeroUsize::new(limit)) {
                (Schedule::Wavefront, Some(limit)) => plan_waves(manifest.batch.len(), limit),
                _ => vec![0..manifest.batch.len()],
            };
            for (number, group) in groups.into_iter().enumerate() {
                if schedule == Schedule::Wavefront {
                    let _ = writeln!(out, "  wave {}:", number + 1);
                }
                for index in group {
                    let _ = writeln!(out, "    item {}:", index);
                    for command in manifest.batch.items()[index].commands() {
                        let _ = writeln!(out, "      $ {}", command);
                    }
                }
            }
        }
        out
    }

    /// Reject any manifest the executor would refuse, before the first one runs
    fn check_runnable(&self, manifests: &[Manifest], jobs: Option<NonZeroUsize>) -> Result<()> {
        for manifest in manifests {
            if manifest.batch.is_empty() {
                return Err(ManifestError::Empty(manifest.path.clone()).into());
            }
            let limit = self.concurrency_for(manifest, jobs);
            if limit == 0 {
                tracing::error!(path = %manifest.path.display(), "maximum concurrency is 0");
                return Err(BatchError::InvalidConcurrency(limit).into());
            }
        }
        Ok(())
    }

    /// Run manifests in order; stops starting new ones once cancelled
    pub async fn run(
        &self,
        manifests: Vec<Manifest>,
        jobs: Option<NonZeroUsize>,
    ) -> Result<Vec<ManifestRun>> {
        self.check_runnable(&manifests, jobs)?;

        let executor =
            BatchExecutor::from_config(&self.config).with_cancellation(self.cancel.clone());
        let mut runs = Vec::with_capacity(manifests.len());

        for manifest in manifests {
            if self.cancel.is_cancelled() {
                tracing::warn!(path = %manifest.path.display(), "cancelled; skipping manifest");
                break;
            }

            let max_concurrency = self.concurrency_for(&manifest, jobs);
            tracing::info!(
                path = %manifest.path.display(),
                items = manifest.batch.len(),
                max_concurrency,
                "starting manifest"
            );
            let report = executor.run(manifest.batch, max_concurrency).await?;
            runs.push(ManifestRun {
                path: manifest.path,
                max_concurrency,
                report,
            });
        }
        Ok(runs)
    }
}

/// Process exit code: the number of failed items, clamped to 255
pub fn exit_code(runs: &[ManifestRun]) -> i32 {
    let failures: usize = runs.iter().map(|run| run.report.failure_count()).sum();
    failures.min(255) as i32
}
