//! Configuration management for caret-batch.
//!
//! Supports layered configuration: defaults → project → user → env

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Name of the per-project configuration file
pub const PROJECT_CONFIG_FILE: &str = ".caret-batch.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub output: OutputMode,
}

impl RunnerConfig {
    /// Load configuration with hierarchy: defaults → project → user → env
    pub fn load(project_root: Option<&Path>) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder();

        // 1. Start with defaults
        builder = builder.add_source(
            File::from_str(
                include_str!("../default_config.toml"),
                config::FileFormat::Toml,
            )
            .required(false),
        );

        // 2. Project-specific config (.caret-batch.toml in project root)
        if let Some(root) = project_root {
            let project_config = root.join(PROJECT_CONFIG_FILE);
            if project_config.exists() {
                builder = builder.add_source(File::from(project_config).required(false));
            }
        }

        // 3. User config (~/.config/caret-batch/config.toml)
        if let Some(config_dir) = directories::ProjectDirs::from("edu", "caret", "caret-batch") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(File::from(user_config).required(false));
            }
        }

        // 4. Environment variables (CARET_BATCH__*)
        builder = builder.add_source(
            Environment::with_prefix("CARET_BATCH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Load an explicit configuration file on top of the defaults
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        use config::{Config, File};

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let loaded: Self = Config::builder()
            .add_source(File::from_str(
                include_str!("../default_config.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(File::from(path.to_path_buf()))
            .build()
            .and_then(|c| c.try_deserialize::<Self>())
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values the executor cannot honor
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "executor.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.executor.command_timeout_seconds == Some(0) {
            return Err(ConfigError::Invalid(
                "executor.command_timeout_seconds must be positive".to_string(),
            ));
        }
        if self.shell.program.trim().is_empty() {
            return Err(ConfigError::Invalid("shell.program is empty".to_string()));
        }
        Ok(())
    }
}

/// Scheduling and resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum number of work items running at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// How work items are dispatched onto the pool
    #[serde(default)]
    pub schedule: Schedule,
    /// Per-command timeout; unset means wait forever
    #[serde(default)]
    pub command_timeout_seconds: Option<u64>,
}

impl ExecutorConfig {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_seconds.map(Duration::from_secs)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            schedule: Schedule::default(),
            command_timeout_seconds: None,
        }
    }
}

fn default_max_concurrency() -> usize {
    4
}

/// Work item dispatch strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    /// Run items in consecutive groups, joining each group before the next
    #[default]
    Wavefront,
    /// Start the next item as soon as any running item finishes
    Sliding,
}

impl FromStr for Schedule {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wavefront" => Ok(Self::Wavefront),
            "sliding" => Ok(Self::Sliding),
            other => Err(ConfigError::Invalid(format!("unknown schedule: {}", other))),
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wavefront => write!(f, "wavefront"),
            Self::Sliding => write!(f, "sliding"),
        }
    }
}

/// Shell used to interpret command strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_shell_program")]
    pub program: String,
    #[serde(default = "default_shell_args")]
    pub args: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: default_shell_program(),
            args: default_shell_args(),
        }
    }
}

fn default_shell_program() -> String {
    let program = if cfg!(windows) { "cmd" } else { "sh" };
    program.to_string()
}

fn default_shell_args() -> Vec<String> {
    vec![if cfg!(windows) { "/C" } else { "-c" }.to_string()]
}

/// Where child process stdout/stderr go
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputMode {
    /// Children share the runner's stdout and stderr
    #[default]
    Inherit,
    /// Output is dropped
    Discard,
    /// One log file per work item inside `directory`
    Log { directory: PathBuf },
}
