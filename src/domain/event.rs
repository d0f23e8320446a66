//! Progress events streamed while a batch runs.

use super::ExecutionResult;

/// Event emitted by the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEvent {
    /// A worker picked up the item
    ItemStarted { index: usize, command_count: usize },
    /// A command within an item is about to launch
    CommandStarted {
        index: usize,
        command_index: usize,
        command: String,
    },
    /// The item reached a terminal state
    ItemFinished(ExecutionResult),
}
