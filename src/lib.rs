//! caret-batch: bounded concurrent execution of shell command batches
//!
//! A batch is a list of work items; each work item is a list of shell
//! commands run strictly in order. Work items run concurrently up to a
//! limit, and a failing item never stops its siblings.

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;

pub use app::App;
pub use config::RunnerConfig;
pub use domain::{Batch, BatchReport, ExecutionResult, ItemStatus, WorkItem};
pub use error::{AppError, BatchError, Result};
pub use services::{submit, BatchExecutor};
