//! Scheduler bookkeeping for one pass: pending, running, finished, held locks.
//!
//! Invariants, checked by [`SchedulerState::check_invariants`]:
//! - a job name is in at most one of pending / running / finished;
//! - a lock is held iff some running job declares it.

use std::collections::BTreeSet;

use reportor_manifest::{JobSpec, Manifest};
use reportor_runner::JobRun;

use crate::types::BlockedJob;

/// Why a pending job cannot start right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Ready,
    /// Required jobs not yet finished.
    WaitingOnJobs(Vec<String>),
    /// Locks currently held by running jobs.
    WaitingOnLocks(Vec<String>),
    /// A required job never launched and dependents are being skipped.
    Blocked(Vec<String>),
}

#[derive(Debug, Default)]
pub struct SchedulerState {
    pub pending: Vec<JobSpec>,
    pub running: Vec<JobRun>,
    pub finished: BTreeSet<String>,
    /// Finished jobs whose process never launched (failed or skipped).
    pub never_launched: BTreeSet<String>,
    pub held_locks: BTreeSet<String>,
}

impl SchedulerState {
    pub fn new(manifest: Manifest) -> Self {
        Self {
            pending: manifest.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty() && self.running.is_empty()
    }

    /// Evaluate `spec` against the current state. `skip_dependents` turns a
    /// requirement on a never-launched job into [`Eligibility::Blocked`].
    pub fn eligibility(&self, spec: &JobSpec, skip_dependents: bool) -> Eligibility {
        if skip_dependents {
            let failed: Vec<String> = spec
                .requires
                .intersection(&self.never_launched)
                .cloned()
                .collect();
            if !failed.is_empty() {
                return Eligibility::Blocked(failed);
            }
        }

        let waiting: Vec<String> = spec.requires.difference(&self.finished).cloned().collect();
        if !waiting.is_empty() {
            return Eligibility::WaitingOnJobs(waiting);
        }

        let contested: Vec<String> = spec.locks.intersection(&self.held_locks).cloned().collect();
        if !contested.is_empty() {
            return Eligibility::WaitingOnLocks(contested);
        }

        Eligibility::Ready
    }

    pub fn acquire(&mut self, spec: &JobSpec) {
        self.held_locks.extend(spec.locks.iter().cloned());
    }

    pub fn release(&mut self, spec: &JobSpec) {
        for lock in &spec.locks {
            self.held_locks.remove(lock);
        }
    }

    /// Pending jobs with their unmet requirements, for deadlock reports.
    pub fn blocked_jobs(&self) -> Vec<BlockedJob> {
        self.pending
            .iter()
            .map(|spec| BlockedJob {
                name: spec.name.clone(),
                waiting_on: spec.requires.difference(&self.finished).cloned().collect(),
            })
            .collect()
    }

    /// Returns a description of the first violated invariant, if any.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut seen = BTreeSet::new();
        let names = self
            .pending
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.running.iter().map(|r| r.name()))
            .chain(self.finished.iter().map(String::as_str));
        for name in names {
            if !seen.insert(name) {
                return Err(format!("job {name} is in more than one set"));
            }
        }

        let mut expected = BTreeSet::new();
        for run in &self.running {
            for lock in &run.spec().locks {
                if !expected.insert(lock.as_str()) {
                    return Err(format!("lock {lock} is held by two running jobs"));
                }
            }
        }
        let held: BTreeSet<&str> = self.held_locks.iter().map(String::as_str).collect();
        if held != expected {
            return Err(format!(
                "held locks {held:?} do not match running jobs' locks {expected:?}"
            ));
        }
        Ok(())
    }
}
