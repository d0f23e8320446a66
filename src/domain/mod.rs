//! Domain entities for caret-batch.
//!
//! This module contains the plain data the executor works on:
//! - WorkItem / Batch: what to run
//! - WorkItemState: per-item lifecycle
//! - ExecutionResult / BatchReport: what happened
//! - ExecutionEvent: progress stream

mod event;
mod result;
mod work_item;

pub use event::ExecutionEvent;
pub use result::{BatchReport, ExecutionResult, Failure, FailureKind, ItemStatus};
pub use work_item::{Batch, ShellCommand, WorkItem, WorkItemState};
