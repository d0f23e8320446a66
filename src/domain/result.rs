//! Per-item outcomes and the aggregated batch report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Why a work item stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// The item held no commands
    EmptyWorkItem,
    /// The command ran and exited non-zero; `None` when killed by a signal
    NonZeroExit { code: Option<i32> },
    /// The OS could not start the shell
    LaunchFailed { message: String },
    /// The command outlived the configured timeout and was killed
    TimedOut { after: Duration },
    /// The batch was cancelled before or while the item ran
    Cancelled,
    /// The task driving the item panicked
    WorkerPanicked { message: String },
}

impl FailureKind {
    /// Launch failures point at the environment, not the command
    pub fn is_environment_problem(&self) -> bool {
        matches!(self, Self::LaunchFailed { .. })
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyWorkItem => write!(f, "command list empty"),
            Self::NonZeroExit { code: Some(code) } => write!(f, "exited with status {}", code),
            Self::NonZeroExit { code: None } => write!(f, "terminated by signal"),
            Self::LaunchFailed { message } => write!(f, "failed to launch: {}", message),
            Self::TimedOut { after } => write!(f, "timed out after {:.1}s", after.as_secs_f64()),
            Self::Cancelled => write!(f, "cancelled"),
            Self::WorkerPanicked { message } => write!(f, "worker panicked: {}", message),
        }
    }
}

/// Failure detail: which command (if any) and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Zero-based index of the failing command within its work item
    pub command_index: Option<usize>,
    pub kind: FailureKind,
}

impl Failure {
    pub fn new(command_index: Option<usize>, kind: FailureKind) -> Self {
        Self {
            command_index,
            kind,
        }
    }
}

/// Terminal status of a work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Succeeded,
    Failed(Failure),
}

/// Outcome of one work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Position of the item in the submitted batch
    pub work_item_index: usize,
    pub status: ItemStatus,
    /// Text of the command that failed, if one did
    pub failing_command: Option<String>,
    pub elapsed: Duration,
}

impl ExecutionResult {
    pub fn succeeded(work_item_index: usize, elapsed: Duration) -> Self {
        Self {
            work_item_index,
            status: ItemStatus::Succeeded,
            failing_command: None,
            elapsed,
        }
    }

    pub fn failed(
        work_item_index: usize,
        failure: Failure,
        failing_command: Option<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            work_item_index,
            status: ItemStatus::Failed(failure),
            failing_command,
            elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, ItemStatus::Succeeded)
    }

    pub fn failure(&self) -> Option<&Failure> {
        match &self.status {
            ItemStatus::Failed(failure) => Some(failure),
            ItemStatus::Succeeded => None,
        }
    }

    /// One-line description used in problem listings
    pub fn problem_line(&self) -> Option<String> {
        let failure = self.failure()?;
        let mut line = match failure.command_index {
            Some(index) => format!(
                "item {} failed at command {} ({})",
                self.work_item_index,
                index + 1,
                failure.kind
            ),
            None => format!("item {} failed ({})", self.work_item_index, failure.kind),
        };
        if let Some(command) = &self.failing_command {
            line.push_str(": ");
            line.push_str(command);
        }
        Some(line)
    }
}

/// All results of one batch, ordered by work item index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    results: Vec<ExecutionResult>,
    elapsed: Duration,
}

impl BatchReport {
    pub fn new(mut results: Vec<ExecutionResult>, elapsed: Duration) -> Self {
        results.sort_by_key(|r| r.work_item_index);
        Self { results, elapsed }
    }

    pub fn results(&self) -> &[ExecutionResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<ExecutionResult> {
        self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Wall-clock time of the whole batch
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.results.len() - self.succeeded_count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }

    /// Error count followed by one line per failed item
    pub fn summary(&self) -> String {
        let mut out = format!("There were {} errors.", self.failure_count());
        if !self.is_success() {
            out.push_str("\nPROBLEMS:");
            for line in self.failures().filter_map(ExecutionResult::problem_line) {
                out.push_str("\n  ");
                out.push_str(&line);
            }
        }
        out
    }
}
