//! Runs the command sequence of a single work item.
//!
//! No concurrency lives here: a work item is one future that launches its
//! commands strictly in order and stops at the first failure.

use crate::domain::{
    ExecutionEvent, ExecutionResult, Failure, FailureKind, WorkItem, WorkItemState,
};
use crate::services::{CancelToken, CommandRunner};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything a worker shares with its siblings (all read-only)
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub runner: Arc<CommandRunner>,
    pub cancel: CancelToken,
    pub events: Option<mpsc::UnboundedSender<ExecutionEvent>>,
}

impl WorkerContext {
    pub fn new(runner: Arc<CommandRunner>) -> Self {
        Self {
            runner,
            cancel: CancelToken::never(),
            events: None,
        }
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(tx) = &self.events {
            // Receiver may be gone; progress is best-effort
            let _ = tx.send(event);
        }
    }
}

/// Execute one work item and produce its result
pub async fn run_work_item(index: usize, item: WorkItem, ctx: &WorkerContext) -> ExecutionResult {
    let mut state = WorkItemState::Pending;

    if item.is_empty() {
        tracing::error!(item = index, "command list empty");
        state.fail(Failure::new(None, FailureKind::EmptyWorkItem));
        return finish(index, &item, state, ctx);
    }

    if ctx.cancel.is_cancelled() {
        tracing::warn!(item = index, "batch cancelled before work item started");
        state.fail(Failure::new(None, FailureKind::Cancelled));
        return finish(index, &item, state, ctx);
    }

    let log = match ctx.runner.open_item_log(index, item.len()) {
        Ok(log) => log,
        Err(e) => {
            tracing::error!(item = index, "failed to open work item log: {}", e);
            state.fail(Failure::new(
                None,
                FailureKind::LaunchFailed {
                    message: format!("cannot open log file: {}", e),
                },
            ));
            return finish(index, &item, state, ctx);
        }
    };

    tracing::info!(item = index, commands = item.len(), "starting work item");
    ctx.emit(ExecutionEvent::ItemStarted {
        index,
        command_count: item.len(),
    });
    state.start();

    for (command_index, command) in item.commands().iter().enumerate() {
        ctx.emit(ExecutionEvent::CommandStarted {
            index,
            command_index,
            command: command.to_string(),
        });
        tracing::debug!(item = index, command_index, command = %command, "executing");

        let outcome = ctx.runner.run(command, log.as_ref(), &ctx.cancel).await;
        let Some(kind) = outcome.into_failure_kind() else {
            state.advance();
            continue;
        };

        if kind.is_environment_problem() {
            tracing::error!(item = index, command = %command, "command could not be launched: {}", kind);
        } else if matches!(kind, FailureKind::TimedOut { .. } | FailureKind::Cancelled) {
            tracing::warn!(item = index, command = %command, "command stopped: {}", kind);
        } else {
            tracing::error!(item = index, command = %command, "command failed: {}", kind);
        }
        state.fail(Failure::new(Some(command_index), kind));
        break;
    }

    state.succeed();
    finish(index, &item, state, ctx)
}

fn finish(
    index: usize,
    item: &WorkItem,
    state: WorkItemState,
    ctx: &WorkerContext,
) -> ExecutionResult {
    let result = match state {
        WorkItemState::Succeeded { duration } => ExecutionResult::succeeded(index, duration),
        WorkItemState::Failed { failure, duration } => {
            let command = failure
                .command_index
                .and_then(|i| item.command(i))
                .map(ToString::to_string);
            ExecutionResult::failed(index, failure, command, duration)
        }
        unfinished => ExecutionResult::failed(
            index,
            Failure::new(unfinished.command_index(), FailureKind::Cancelled),
            None,
            unfinished.elapsed(),
        ),
    };

    if result.is_success() {
        tracing::info!(item = index, elapsed = ?result.elapsed, "work item succeeded");
    }
    ctx.emit(ExecutionEvent::ItemFinished(result.clone()));
    result
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::OutputMode;
    use crate::domain::ItemStatus;
    use tempfile::TempDir;

    fn context() -> WorkerContext {
        WorkerContext::new(Arc::new(
            CommandRunner::default().with_output(OutputMode::Discard),
        ))
    }

    #[tokio::test]
    async fn test_all_commands_succeed() {
        let item = WorkItem::from_iter(["true", "true"]);
        let result = run_work_item(0, item, &context()).await;
        assert!(result.is_success());
        assert_eq!(result.failing_command, None);
    }

    #[tokio::test]
    async fn test_short_circuit_on_failure() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("c1");
        let third = temp.path().join("c3");
        let item = WorkItem::from_iter([
            format!("touch {}", first.display()),
            "exit 1".to_string(),
            format!("touch {}", third.display()),
        ]);

        let result = run_work_item(5, item, &context()).await;

        assert_eq!(result.work_item_index, 5);
        assert_eq!(result.failing_command.as_deref(), Some("exit 1"));
        assert_eq!(
            result.status,
            ItemStatus::Failed(Failure::new(
                Some(1),
                FailureKind::NonZeroExit { code: Some(1) }
            ))
        );
        assert!(first.exists());
        assert!(!third.exists());
    }

    #[tokio::test]
    async fn test_timed_out_command_stops_item() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("after");
        let timeout = std::time::Duration::from_millis(200);
        let ctx = WorkerContext::new(Arc::new(
            CommandRunner::default()
                .with_output(OutputMode::Discard)
                .with_timeout(Some(timeout)),
        ));
        let item = WorkItem::from_iter([
            "true".to_string(),
            "sleep 5".to_string(),
            format!("touch {}", marker.display()),
        ]);

        let result = run_work_item(3, item, &ctx).await;

        assert_eq!(
            result.status,
            ItemStatus::Failed(Failure::new(
                Some(1),
                FailureKind::TimedOut { after: timeout }
            ))
        );
        assert_eq!(result.failing_command.as_deref(), Some("sleep 5"));
        assert!(result.elapsed < std::time::Duration::from_secs(4));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_empty_item_fails() {
        let result = run_work_item(2, WorkItem::default(), &context()).await;
        assert_eq!(
            result.failure(),
            Some(&Failure::new(None, FailureKind::EmptyWorkItem))
        );
        assert_eq!(result.failing_command, None);
    }

    #[tokio::test]
    async fn test_events_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ctx = context();
        ctx.events = Some(tx);

        let item = WorkItem::from_iter(["true", "false", "true"]);
        run_work_item(1, item, &ctx).await;
        drop(ctx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            ExecutionEvent::ItemStarted {
                index: 1,
                command_count: 3
            }
        );
        assert!(matches!(
            &events[2],
            ExecutionEvent::CommandStarted { command_index: 1, command, .. } if command == "false"
        ));
        assert!(matches!(&events[3], ExecutionEvent::ItemFinished(r) if !r.is_success()));
    }

    #[tokio::test]
    async fn test_cancelled_item_never_starts() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("ran");
        let (handle, token) = crate::services::cancellation();
        handle.cancel();

        let mut ctx = context();
        ctx.cancel = token;
        let item = WorkItem::single(format!("touch {}", marker.display()));
        let result = run_work_item(0, item, &ctx).await;

        assert_eq!(
            result.failure(),
            Some(&Failure::new(None, FailureKind::Cancelled))
        );
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_unwritable_log_dir_fails_item() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, "").unwrap();

        let ctx = WorkerContext::new(Arc::new(CommandRunner::default().with_output(
            OutputMode::Log {
                directory: blocker.join("logs"),
            },
        )));
        let result = run_work_item(0, WorkItem::single("true"), &ctx).await;
        assert!(matches!(
            result.failure().map(|f| &f.kind),
            Some(FailureKind::LaunchFailed { .. })
        ));
    }
}
