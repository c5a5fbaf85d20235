//! Error types for func-testkit.
//!
//! Every fatal condition the harness can hit surfaces as one [`FuncTestError`]
//! variant. Best-effort failures (kills during disposal, per-process lookups
//! while walking a process tree) never reach this type; they are logged and
//! dropped where they happen.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the harness.
#[derive(Debug, Error)]
pub enum FuncTestError {
    // Configuration errors
    #[error("Invalid port parameter {value}")]
    InvalidPort { value: String },

    #[error("Unable to find '{tool}'. Make sure Azure Functions Core Tools are installed. See: https://learn.microsoft.com/en-us/azure/azure-functions/functions-run-local")]
    ToolNotFound { tool: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    // Spawn errors
    #[error("Executable not found: {program}")]
    ExecutableNotFound { program: String },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Startup and shutdown
    #[error("'func' failed to start (exited prematurely with exit code {}). Check log for more details", display_code(.exit_code))]
    StartupFailed { exit_code: Option<i32> },

    #[error("Health check at {url} did not succeed after {attempts} attempts")]
    HealthCheckExhausted { url: String, attempts: u32 },

    #[error("'func' stopped prematurely with exit code {exit_code}. Check log for more details")]
    StoppedPrematurely { exit_code: i32 },

    #[error("Process did not exit within {0:?}")]
    Timeout(Duration),

    #[error("Process is not running. Call start or run first")]
    NotStarted,

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, FuncTestError>;

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "<none>".to_string(), |c| c.to_string())
}

impl From<std::io::Error> for FuncTestError {
    fn from(err: std::io::Error) -> Self {
        FuncTestError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for FuncTestError {
    fn from(err: reqwest::Error) -> Self {
        FuncTestError::Network {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl FuncTestError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        FuncTestError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// True for errors raised before any process was spawned.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FuncTestError::InvalidPort { .. }
                | FuncTestError::ToolNotFound { .. }
                | FuncTestError::Config { .. }
                | FuncTestError::DirectoryNotFound(_)
        )
    }

    /// Exit code reported by the supervised process, if this error carries one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            FuncTestError::StartupFailed { exit_code } => *exit_code,
            FuncTestError::StoppedPrematurely { exit_code } => Some(*exit_code),
            _ => None,
        }
    }
}
