use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why a single tool invocation did not produce a usable result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolFailure {
    #[error("{tool} not found in PATH or common install locations")]
    NotFound { tool: String },

    #[error("{tool} exited with code {code:?}: {stderr_tail}")]
    NonZeroExit {
        tool: String,
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("{tool} timed out after {}s", after.as_secs())]
    TimedOut { tool: String, after: Duration },

    #[error("{tool} finished but wrote no output to {path:?}")]
    MissingOutput { tool: String, path: PathBuf },

    #[error("failed to spawn {tool}: {reason}")]
    Spawn { tool: String, reason: String },

    #[error("{tool} interrupted by user")]
    Interrupted { tool: String },
}

impl ToolFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolFailure::NotFound { .. } => "not_found",
            ToolFailure::NonZeroExit { .. } => "nonzero_exit",
            ToolFailure::TimedOut { .. } => "timed_out",
            ToolFailure::MissingOutput { .. } => "missing_output",
            ToolFailure::Spawn { .. } => "spawn_failed",
            ToolFailure::Interrupted { .. } => "interrupted",
        }
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self, ToolFailure::Interrupted { .. })
    }
}

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("scan interrupted by user")]
    Interrupted,

    #[error("report failure: {0}")]
    Report(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReconError {
    pub fn config(msg: impl Into<String>) -> Self {
        ReconError::Configuration(msg.into())
    }
}
