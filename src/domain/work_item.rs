//! Commands, work items and batches, plus the per-item execution state.

use super::Failure;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// An opaque command line handed to the shell
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShellCommand(String);

impl ShellCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self(command.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShellCommand {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ShellCommand {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Commands that run one after another; the unit of independent scheduling.
///
/// An empty work item can be constructed but never executes: the executor
/// reports it as failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItem {
    commands: Vec<ShellCommand>,
}

impl WorkItem {
    pub fn new(commands: Vec<ShellCommand>) -> Self {
        Self { commands }
    }

    /// Work item holding exactly one command
    pub fn single(command: impl Into<ShellCommand>) -> Self {
        Self {
            commands: vec![command.into()],
        }
    }

    pub fn commands(&self) -> &[ShellCommand] {
        &self.commands
    }

    pub fn command(&self, index: usize) -> Option<&ShellCommand> {
        self.commands.get(index)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl<S: Into<ShellCommand>> FromIterator<S> for WorkItem {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// Work items submitted together to one `run` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Batch {
    items: Vec<WorkItem>,
}

impl Batch {
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self { items }
    }

    /// Build a batch from nested command strings
    pub fn from_commands<I, J, S>(items: I) -> Self
    where
        I: IntoIterator<Item = J>,
        J: IntoIterator<Item = S>,
        S: Into<ShellCommand>,
    {
        Self {
            items: items.into_iter().map(WorkItem::from_iter).collect(),
        }
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn push(&mut self, item: WorkItem) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl IntoIterator for Batch {
    type Item = WorkItem;
    type IntoIter = std::vec::IntoIter<WorkItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl FromIterator<WorkItem> for Batch {
    fn from_iter<T: IntoIterator<Item = WorkItem>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Lifecycle of one work item: `Pending → Running → {Succeeded | Failed}`
#[derive(Debug, Clone, Default)]
pub enum WorkItemState {
    /// Waiting for a worker slot
    #[default]
    Pending,
    /// Executing the command at `command_index`
    Running {
        command_index: usize,
        started_at: Instant,
    },
    /// Every command exited with status 0
    Succeeded { duration: Duration },
    /// Stopped at the first failing command (or never started)
    Failed { failure: Failure, duration: Duration },
}

impl WorkItemState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Check if the item has reached a terminal state
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }

    /// Index of the command currently executing
    pub fn command_index(&self) -> Option<usize> {
        match self {
            Self::Running { command_index, .. } => Some(*command_index),
            _ => None,
        }
    }

    /// Time spent so far, or in total once finished
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Pending => Duration::ZERO,
            Self::Running { started_at, .. } => started_at.elapsed(),
            Self::Succeeded { duration } | Self::Failed { duration, .. } => *duration,
        }
    }

    /// Pending → Running at the first command
    pub fn start(&mut self) {
        if self.is_pending() {
            *self = Self::Running {
                command_index: 0,
                started_at: Instant::now(),
            };
        }
    }

    /// Move to the next command after a successful one
    pub fn advance(&mut self) {
        if let Self::Running { command_index, .. } = self {
            *command_index += 1;
        }
    }

    /// Running → Succeeded
    pub fn succeed(&mut self) {
        if let Self::Running { started_at, .. } = self {
            *self = Self::Succeeded {
                duration: started_at.elapsed(),
            };
        }
    }

    /// Any non-terminal state → Failed
    pub fn fail(&mut self, failure: Failure) {
        if !self.is_finished() {
            let duration = self.elapsed();
            *self = Self::Failed { failure, duration };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FailureKind;

    #[test]
    fn test_batch_from_commands() {
        let batch = Batch::from_commands(vec![vec!["true"], vec!["false", "echo hi"]]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.items()[1].len(), 2);
        assert_eq!(batch.items()[1].command(1).unwrap().as_str(), "echo hi");
    }

    #[test]
    fn test_empty_work_item_allowed() {
        let batch = Batch::from_commands(vec![Vec::<String>::new()]);
        assert_eq!(batch.len(), 1);
        assert!(batch.items()[0].is_empty());
    }

    #[test]
    fn test_state_transitions() {
        let mut state = WorkItemState::default();
        assert!(state.is_pending());

        state.start();
        assert_eq!(state.command_index(), Some(0));
        state.advance();
        state.advance();
        assert_eq!(state.command_index(), Some(2));

        state.succeed();
        assert!(state.is_finished());
        assert!(matches!(state, WorkItemState::Succeeded { .. }));

        // Terminal states ignore further transitions
        state.fail(Failure::new(None, FailureKind::Cancelled));
        assert!(matches!(state, WorkItemState::Succeeded { .. }));
    }

    #[test]
    fn test_fail_from_pending() {
        let mut state = WorkItemState::Pending;
        state.succeed();
        assert!(state.is_pending());

        state.fail(Failure::new(None, FailureKind::EmptyWorkItem));
        match state {
            WorkItemState::Failed { failure, duration } => {
                assert_eq!(failure.kind, FailureKind::EmptyWorkItem);
                assert_eq!(duration, Duration::ZERO);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_work_item_serde_is_plain_list() {
        let item = WorkItem::from_iter(["cd data", "make"]);
        let json = serde_json::to_string(&item).unwrap();
        assert_eq!(json, r#"["cd data","make"]"#);
    }
}
