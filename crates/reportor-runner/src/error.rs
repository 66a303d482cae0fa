//! Error types for the reportor-runner crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    /// Creating directories or output files failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The child process could not be launched.
    #[error("Spawn error for job {job}: {source}")]
    Spawn {
        job: String,
        #[source]
        source: std::io::Error,
    },

    /// An argv command with no program.
    #[error("Empty command for job {job}")]
    EmptyCommand { job: String },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, RunnerError>;
