use chrono::{DateTime, Utc};
use reportor_runner::{CopyStats, JobOutcome};
use serde::{Deserialize, Serialize};

/// Final state of one job in a scheduling pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: JobOutcome,
    /// Present when `copy_files` collection ran.
    pub copied: Option<CopyStats>,
}

/// Scheduler transitions in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum SchedulerEvent {
    Started { job: String },
    KillRequested { job: String },
    Finished { job: String },
    Skipped { job: String },
}

/// A pending job that can never become eligible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedJob {
    pub name: String,
    /// Required job names that have not finished.
    pub waiting_on: Vec<String>,
}

/// Everything observable about a completed (or cancelled) pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// In completion order.
    pub records: Vec<JobRecord>,
    pub events: Vec<SchedulerEvent>,
    /// Jobs left pending when the pass was interrupted.
    pub not_started: Vec<String>,
    pub interrupted: bool,
}

impl RunReport {
    pub fn record(&self, name: &str) -> Option<&JobRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Records whose outcome counts as a failure.
    pub fn failures(&self) -> impl Iterator<Item = &JobRecord> {
        self.records.iter().filter(|r| r.outcome.is_failure())
    }

    /// True if any job failed to start, timed out, was skipped, or the pass
    /// was interrupted.
    pub fn has_failures(&self) -> bool {
        self.interrupted || self.failures().next().is_some()
    }

    /// Position of `event` in the event log.
    pub fn position(&self, event: &SchedulerEvent) -> Option<usize> {
        self.events.iter().position(|e| e == event)
    }
}
