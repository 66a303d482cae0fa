use reportor_runner::RunnerError;
use thiserror::Error;

use crate::types::{BlockedJob, RunReport};

/// Errors that end a scheduling pass early.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Pending jobs remain but nothing is running, so no future tick can
    /// satisfy their requirements. Carries the report of what did run.
    #[error("Deadlock: {count} job(s) can never start: {summary}", count = .blocked.len(), summary = describe(.blocked))]
    Deadlock {
        blocked: Vec<BlockedJob>,
        report: Box<RunReport>,
    },

    /// The runner could not be set up for this pass.
    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

fn describe(blocked: &[BlockedJob]) -> String {
    blocked
        .iter()
        .map(|b| format!("{} (waiting on {})", b.name, b.waiting_on.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}
