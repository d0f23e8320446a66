//! Execution services for caret-batch.
//!
//! This module contains:
//! - CommandRunner: launching one command through the shell
//! - run_work_item: sequential execution of one work item
//! - WorkerPool: bounded scheduling (wavefront or sliding)
//! - BatchExecutor: the public entry point tying them together
//! - Manifest: batches loaded from files

mod cancel;
pub mod executor;
mod manifest;
pub mod process;
pub mod scheduler;
pub mod worker;

pub use cancel::{cancellation, CancelHandle, CancelToken};
pub use executor::{submit, BatchExecutor};
pub use manifest::Manifest;
pub use process::{CommandOutcome, CommandRunner, ItemLog};
pub use scheduler::{plan_waves, pool_for, Job, Sliding, Wavefront, WorkerPool};
pub use worker::{run_work_item, WorkerContext};
