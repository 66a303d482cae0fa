use chrono::Utc;
use reportor_core::config::{LaunchFailurePolicy, SchedulerConfig};
use reportor_manifest::{JobSpec, Manifest};
use reportor_runner::{JobOutcome, JobRun, JobRunner, Liveness};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{
    error::{Result, SchedulerError},
    state::{Eligibility, SchedulerState},
    types::{JobRecord, RunReport, SchedulerEvent},
};

/// Runs one manifest to completion: admits eligible jobs, polls running ones
/// every tick, and kills the ones that overrun their budget.
///
/// All scheduler state lives on the task driving [`Scheduler::run`]; child
/// processes run concurrently and are only observed through non-blocking
/// polls between ticks.
pub struct Scheduler {
    runner: JobRunner,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(runner: JobRunner, config: SchedulerConfig) -> Self {
        Self { runner, config }
    }

    /// Run every job in `manifest` until none are pending or running.
    pub async fn run(&self, manifest: Manifest) -> Result<RunReport> {
        let (_keep_open, shutdown) = watch::channel(false);
        self.run_until(manifest, shutdown).await
    }

    /// Like [`Scheduler::run`], but stops early once `shutdown` becomes
    /// `true`: running jobs are killed and reaped, pending jobs are left
    /// unstarted, and the report is marked interrupted.
    pub async fn run_until(
        &self,
        manifest: Manifest,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunReport> {
        let tick = self.config.tick_interval();
        let mut state = SchedulerState::new(manifest);
        let mut report = RunReport::default();
        let mut shutdown_open = true;

        info!(
            jobs = state.pending.len(),
            output_dir = %self.runner.output_base().display(),
            now = self.runner.now().timestamp(),
            "scheduling pass started"
        );

        loop {
            if *shutdown.borrow() {
                self.interrupt(&mut state, &mut report).await;
                return Ok(report);
            }

            self.admit(&mut state, &mut report);
            debug_assert_eq!(state.check_invariants(), Ok(()));

            if state.is_done() {
                break;
            }

            // Nothing running means no lock will be released and no
            // requirement will finish: the remaining jobs are stuck for good.
            if state.running.is_empty() {
                let blocked = state.blocked_jobs();
                for job in &blocked {
                    error!(job = %job.name, waiting_on = ?job.waiting_on, "unresolvable requirement");
                }
                return Err(SchedulerError::Deadlock {
                    blocked,
                    report: Box::new(report),
                });
            }

            tokio::select! {
                _ = tokio::time::sleep(tick) => {}
                changed = shutdown.changed(), if shutdown_open => {
                    if changed.is_err() {
                        // Sender dropped: nobody can cancel us any more.
                        shutdown_open = false;
                    }
                }
            }

            self.reap(&mut state, &mut report).await;
            debug_assert_eq!(state.check_invariants(), Ok(()));
        }

        info!(
            jobs = report.records.len(),
            failures = report.failures().count(),
            "scheduling pass finished"
        );
        Ok(report)
    }

    /// Start every pending job whose requirements are finished and whose
    /// locks are free. Admission order is not a priority.
    ///
    /// Skipping a job finishes it on the spot, which can unblock (or skip)
    /// others, so passes repeat until no job is skipped.
    fn admit(&self, state: &mut SchedulerState, report: &mut RunReport) {
        let skip_dependents = self.config.launch_failure == LaunchFailurePolicy::SkipDependents;

        while self.admit_once(state, report, skip_dependents) {}
    }

    /// One admission sweep. Returns whether any job was skipped.
    fn admit_once(
        &self,
        state: &mut SchedulerState,
        report: &mut RunReport,
        skip_dependents: bool,
    ) -> bool {
        let mut skipped_any = false;

        for spec in std::mem::take(&mut state.pending) {
            match state.eligibility(&spec, skip_dependents) {
                Eligibility::Ready => {
                    info!(job = %spec.name, "starting");
                    state.acquire(&spec);
                    report.events.push(SchedulerEvent::Started {
                        job: spec.name.clone(),
                    });
                    state.running.push(self.runner.start(spec));
                }
                Eligibility::WaitingOnJobs(waiting) => {
                    debug!(job = %spec.name, ?waiting, "still waiting for jobs");
                    state.pending.push(spec);
                }
                Eligibility::WaitingOnLocks(waiting) => {
                    debug!(job = %spec.name, ?waiting, "still waiting for locks");
                    state.pending.push(spec);
                }
                Eligibility::Blocked(blocked_by) => {
                    warn!(job = %spec.name, ?blocked_by, "skipping; required job never launched");
                    skip(state, report, spec, blocked_by);
                    skipped_any = true;
                }
            }
        }

        skipped_any
    }

    /// Poll every running job: reap the exited ones, kill the overdue ones.
    async fn reap(&self, state: &mut SchedulerState, report: &mut RunReport) {
        let mut still_running = Vec::with_capacity(state.running.len());

        for mut run in std::mem::take(&mut state.running) {
            match run.poll() {
                Liveness::Exited => {
                    run.wait().await;
                    finish(state, report, run);
                }
                Liveness::Running => {
                    if run.is_overdue() && !run.kill_requested() {
                        info!(
                            job = %run.name(),
                            max_time_secs = run.spec().max_time_seconds,
                            "killing; it's taking too long"
                        );
                        run.kill();
                        report.events.push(SchedulerEvent::KillRequested {
                            job: run.name().to_string(),
                        });
                    }
                    still_running.push(run);
                }
            }
        }

        state.running = still_running;
    }

    async fn interrupt(&self, state: &mut SchedulerState, report: &mut RunReport) {
        warn!(
            running = state.running.len(),
            pending = state.pending.len(),
            "shutdown requested; killing running jobs"
        );
        for run in &mut state.running {
            run.interrupt();
        }
        for mut run in std::mem::take(&mut state.running) {
            run.wait().await;
            finish(state, report, run);
        }
        report.not_started = std::mem::take(&mut state.pending)
            .into_iter()
            .map(|spec| spec.name)
            .collect();
        report.interrupted = true;
    }
}

fn finish(state: &mut SchedulerState, report: &mut RunReport, run: JobRun) {
    let outcome = run
        .outcome()
        .cloned()
        .unwrap_or_else(|| JobOutcome::WaitFailed {
            error: "no outcome recorded".to_string(),
        });
    let finished_at = run.finished_at().unwrap_or_else(Utc::now);
    let elapsed = (finished_at - run.started_at()).num_milliseconds() as f64 / 1000.0;

    if outcome.is_failure() {
        warn!(job = %run.name(), elapsed_secs = elapsed, %outcome, "finished");
    } else {
        info!(job = %run.name(), elapsed_secs = elapsed, %outcome, "finished");
    }

    let name = run.name().to_string();
    state.release(run.spec());
    if outcome.never_launched() {
        state.never_launched.insert(name.clone());
    }
    state.finished.insert(name.clone());

    report.events.push(SchedulerEvent::Finished { job: name.clone() });
    report.records.push(JobRecord {
        name,
        started_at: run.started_at(),
        finished_at,
        outcome,
        copied: run.copy_stats(),
    });
}

fn skip(state: &mut SchedulerState, report: &mut RunReport, spec: JobSpec, blocked_by: Vec<String>) {
    let now = Utc::now();
    state.never_launched.insert(spec.name.clone());
    state.finished.insert(spec.name.clone());
    report.events.push(SchedulerEvent::Skipped {
        job: spec.name.clone(),
    });
    report.records.push(JobRecord {
        name: spec.name,
        started_at: now,
        finished_at: now,
        outcome: JobOutcome::Skipped { blocked_by },
        copied: None,
    });
}
