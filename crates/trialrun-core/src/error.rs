//! Error taxonomy for trial orchestration.

use std::path::PathBuf;

/// Errors produced while preparing or executing a batch of trials.
#[derive(Debug, thiserror::Error)]
pub enum TrialError {
    /// A file carrying the requested prefix already exists in the workspace.
    #[error(
        "files with prefix '{prefix}' already exist in this workspace ({}); choose a new prefix",
        path.display()
    )]
    NamespaceCollision { prefix: String, path: PathBuf },

    /// A requested model has no packaged archive in any known location.
    #[error("model '{model}' is not installed (searched: {})", display_paths(searched))]
    ModelNotFound {
        model: String,
        searched: Vec<PathBuf>,
    },

    #[error("malformed seed template at marker '{marker}': {reason}")]
    MalformedTemplate { marker: String, reason: String },

    #[error("malformed formatted input at line {line}: {reason}")]
    MalformedInput { line: usize, reason: String },

    /// The model runner exited unsuccessfully. Recorded, never escalated by the pipeline.
    #[error("model runner for '{model}' exited with code {exit_code}")]
    RunnerFailure { model: String, exit_code: i32 },

    #[error("data formatter exited with code {exit_code}")]
    FormatterFailure { exit_code: i32 },

    #[error("evaluator exited with code {exit_code}")]
    EvaluatorFailure { exit_code: i32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for trial orchestration.
pub type Result<T> = std::result::Result<T, TrialError>;
