//! Shared data types for reportor-runner.

use serde::{Deserialize, Serialize};

/// Result of a non-blocking liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Running,
    Exited,
}

/// How a job run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum JobOutcome {
    /// The job has no command; it finished the moment it started.
    NoCommand,

    /// The process exited on its own with `code`.
    Exited { code: i32 },

    /// The process was terminated by a signal nobody here sent.
    Signaled { signal: Option<i32> },

    /// The process was killed for exceeding `max_time_seconds`.
    TimedOut,

    /// The process was killed because the scheduling pass was cancelled.
    Interrupted,

    /// The process could not be launched at all.
    FailedToStart { error: String },

    /// Waiting on the process failed; its real exit status is unknown.
    WaitFailed { error: String },

    /// Never run because a required job failed to start.
    Skipped { blocked_by: Vec<String> },
}

impl JobOutcome {
    /// Outcomes that make the overall run unsuccessful.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            JobOutcome::TimedOut
                | JobOutcome::Interrupted
                | JobOutcome::FailedToStart { .. }
                | JobOutcome::WaitFailed { .. }
                | JobOutcome::Skipped { .. }
        )
    }

    /// True when no process was ever launched for this job.
    pub fn never_launched(&self) -> bool {
        matches!(
            self,
            JobOutcome::FailedToStart { .. } | JobOutcome::Skipped { .. }
        )
    }
}

impl std::fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobOutcome::NoCommand => write!(f, "no command"),
            JobOutcome::Exited { code } => write!(f, "exited with {code}"),
            JobOutcome::Signaled { signal: Some(s) } => write!(f, "killed by signal {s}"),
            JobOutcome::Signaled { signal: None } => write!(f, "killed by signal"),
            JobOutcome::TimedOut => write!(f, "timed out"),
            JobOutcome::Interrupted => write!(f, "interrupted"),
            JobOutcome::FailedToStart { error } => write!(f, "failed to start: {error}"),
            JobOutcome::WaitFailed { error } => write!(f, "wait failed: {error}"),
            JobOutcome::Skipped { blocked_by } => {
                write!(f, "skipped (blocked by {})", blocked_by.join(", "))
            }
        }
    }
}
