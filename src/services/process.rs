//! Process execution service for running shell commands.
//!
//! Handles spawning one command through the configured shell, waiting on its
//! handle, and optional per-item log persistence.

use crate::config::{OutputMode, RunnerConfig, ShellConfig};
use crate::domain::{FailureKind, ShellCommand};
use crate::services::CancelToken;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

/// How a single command ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Exit status 0
    Success,
    /// Non-zero exit; `None` when killed by a signal
    Exited { code: Option<i32> },
    /// The shell could not be started or waited on
    LaunchFailed(String),
    /// Killed after exceeding the timeout
    TimedOut(Duration),
    /// Killed because the batch was cancelled
    Cancelled,
}

impl CommandOutcome {
    /// Failure classification, or `None` on success
    pub fn into_failure_kind(self) -> Option<FailureKind> {
        match self {
            Self::Success => None,
            Self::Exited { code } => Some(FailureKind::NonZeroExit { code }),
            Self::LaunchFailed(message) => Some(FailureKind::LaunchFailed { message }),
            Self::TimedOut(after) => Some(FailureKind::TimedOut { after }),
            Self::Cancelled => Some(FailureKind::Cancelled),
        }
    }
}

/// Log file shared by every command of one work item
#[derive(Debug)]
pub struct ItemLog {
    path: PathBuf,
    file: File,
}

impl ItemLog {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the command line ahead of its output
    fn record_command(&self, command: &ShellCommand) -> io::Result<()> {
        writeln!(&self.file, "$ {}", command)
    }

    fn stdio(&self) -> io::Result<(Stdio, Stdio)> {
        Ok((
            Stdio::from(self.file.try_clone()?),
            Stdio::from(self.file.try_clone()?),
        ))
    }
}

enum Waited {
    Exited(io::Result<std::process::ExitStatus>),
    TimedOut(Duration),
    Cancelled,
}

/// Runs single commands through a shell
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    shell: ShellConfig,
    output: OutputMode,
    timeout: Option<Duration>,
}

impl CommandRunner {
    /// Create a runner for the given shell
    pub fn new(shell: ShellConfig) -> Self {
        Self {
            shell,
            output: OutputMode::default(),
            timeout: None,
        }
    }

    /// Create a runner from loaded configuration
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(config.shell.clone())
            .with_output(config.output.clone())
            .with_timeout(config.executor.command_timeout())
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Generate log file path for a work item
    fn log_file_path(directory: &Path, index: usize) -> PathBuf {
        directory.join(format!("item-{:04}.log", index))
    }

    /// Open the log for a work item when logging to files, writing its header
    pub fn open_item_log(&self, index: usize, command_count: usize) -> io::Result<Option<ItemLog>> {
        let OutputMode::Log { directory } = &self.output else {
            return Ok(None);
        };

        fs::create_dir_all(directory)?;
        let path = Self::log_file_path(directory, index);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        writeln!(file, "# Work item: {} ({} commands)", index, command_count)?;
        writeln!(file, "# Started: {}", unix_timestamp())?;
        if let Ok(cwd) = std::env::current_dir() {
            writeln!(file, "# Directory: {}", cwd.display())?;
        }
        writeln!(file, "---")?;

        Ok(Some(ItemLog { path, file }))
    }

    fn build_command(&self, command: &ShellCommand, log: Option<&ItemLog>) -> io::Result<Command> {
        let mut cmd = Command::new(&self.shell.program);
        cmd.args(&self.shell.args)
            .arg(command.as_str())
            .kill_on_drop(true);
        // Own process group; terminate() signals all of it
        #[cfg(unix)]
        cmd.process_group(0);

        match (&self.output, log) {
            (OutputMode::Discard, _) => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
            (OutputMode::Log { .. }, Some(log)) => {
                log.record_command(command)?;
                let (stdout, stderr) = log.stdio()?;
                cmd.stdout(stdout).stderr(stderr);
            }
            _ => {}
        }
        Ok(cmd)
    }

    /// Run one command to completion, honoring timeout and cancellation
    pub async fn run(
        &self,
        command: &ShellCommand,
        log: Option<&ItemLog>,
        cancel: &CancelToken,
    ) -> CommandOutcome {
        if cancel.is_cancelled() {
            return CommandOutcome::Cancelled;
        }

        let mut child = match self
            .build_command(command, log)
            .and_then(|mut cmd| cmd.spawn())
        {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(
                    command = %command,
                    shell = %self.shell.program,
                    "failed to launch command: {}",
                    e
                );
                return CommandOutcome::LaunchFailed(e.to_string());
            }
        };

        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(after) => {
                    tokio::time::sleep(after).await;
                    after
                }
                None => std::future::pending().await,
            }
        };

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            after = deadline => Waited::TimedOut(after),
            _ = cancel.cancelled() => Waited::Cancelled,
        };

        match waited {
            Waited::Exited(Ok(status)) if status.success() => CommandOutcome::Success,
            Waited::Exited(Ok(status)) => CommandOutcome::Exited {
                code: status.code(),
            },
            Waited::Exited(Err(e)) => CommandOutcome::LaunchFailed(e.to_string()),
            Waited::TimedOut(after) => {
                tracing::warn!(command = %command, "command timed out after {:?}", after);
                terminate(&mut child).await;
                CommandOutcome::TimedOut(after)
            }
            Waited::Cancelled => {
                tracing::warn!(command = %command, "cancelling running command");
                terminate(&mut child).await;
                CommandOutcome::Cancelled
            }
        }
    }
}

/// Kill the child's process group, then reap the child through its own handle
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => tracing::warn!("failed to kill process group {}: {}", pid, e),
        }
    }
    if let Err(e) = child.kill().await {
        tracing::warn!("failed to kill child process: {}", e);
    }
}

/// Seconds since the Unix epoch
fn unix_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    format!("{}", duration.as_secs())
}
