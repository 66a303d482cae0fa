//! `JobRunner`: owns the lifecycle of individual job processes.
//!
//! A [`JobRun`] moves through Created → Started → (Running | FailedToStart)
//! → Finished. The runner never blocks while polling; only [`JobRun::wait`]
//! awaits, and the scheduler calls it once [`JobRun::poll`] reports exit.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reportor_core::config::{RunnerConfig, NOW_ENV, OUTPUT_DIR_ENV};
use reportor_manifest::{Command, JobSpec};
use tokio::process::{Child, Command as AsyncCommand};
use tracing::{debug, info, warn};

use crate::{
    collect::{collect_files, CopyStats},
    error::{Result, RunnerError},
    types::{JobOutcome, Liveness},
};

/// Launches jobs for one scheduling pass.
///
/// Holds the pass-wide parameters every child sees: the output base
/// directory and the logical "now" of the run.
#[derive(Debug, Clone)]
pub struct JobRunner {
    output_base: PathBuf,
    now: DateTime<Utc>,
    config: RunnerConfig,
}

impl JobRunner {
    /// `output_base` is made absolute so children can rely on `OUTPUT_DIR`
    /// regardless of their own working directory.
    pub fn new(
        output_base: impl AsRef<Path>,
        now: DateTime<Utc>,
        config: RunnerConfig,
    ) -> Result<Self> {
        let output_base = std::path::absolute(output_base.as_ref())?;
        Ok(Self {
            output_base,
            now,
            config,
        })
    }

    pub fn output_base(&self) -> &Path {
        &self.output_base
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// `{output_base}/{job name}`.
    pub fn output_dir(&self, spec: &JobSpec) -> PathBuf {
        self.output_base.join(&spec.name)
    }

    /// The job's `working_dir`, resolved against `jobs_root` when configured.
    pub fn working_dir(&self, spec: &JobSpec) -> PathBuf {
        match &self.config.jobs_root {
            Some(root) => root.join(&spec.working_dir),
            None => spec.working_dir.clone(),
        }
    }

    /// Start `spec`. Never fails: a job that cannot be launched comes back
    /// already finished with [`JobOutcome::FailedToStart`].
    pub fn start(&self, spec: JobSpec) -> JobRun {
        let output_dir = self.output_dir(&spec);
        let working_dir = self.working_dir(&spec);
        let mut run = JobRun::created(spec, output_dir, working_dir);

        if let Err(e) = fs::create_dir_all(&run.output_dir) {
            warn!(job = %run.spec.name, "cannot create output directory: {e}");
            run.finish_now(JobOutcome::FailedToStart {
                error: format!("cannot create output directory: {e}"),
            });
            return run;
        }

        let Some(command) = run.spec.command.clone() else {
            debug!(job = %run.spec.name, "no command; finishing immediately");
            run.finish_now(JobOutcome::NoCommand);
            return run;
        };

        match self.spawn(&run, &command) {
            Ok(child) => {
                debug!(job = %run.spec.name, pid = ?child.id(), "process started");
                run.child = Some(child);
            }
            Err(e) => {
                warn!(job = %run.spec.name, "failed to start: {e}");
                run.finish_now(JobOutcome::FailedToStart {
                    error: e.to_string(),
                });
            }
        }
        run
    }

    fn spawn(&self, run: &JobRun, command: &Command) -> Result<Child> {
        let stdout_path = run.stdout_path();
        let stderr_path = run.stderr_path();
        for path in [&stdout_path, &stderr_path] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        let stdout = File::create(&stdout_path)?;
        let stderr = File::create(&stderr_path)?;
        let mut stderr_log = stderr.try_clone()?;

        debug!(job = %run.spec.name, %command, cwd = %run.working_dir.display(), "spawning");

        let mut cmd = match command {
            Command::Shell(script) => {
                let mut c = AsyncCommand::new(&self.config.shell);
                c.arg("-c").arg(script);
                c
            }
            Command::Argv(argv) => {
                let (program, args) = argv.split_first().ok_or_else(|| RunnerError::EmptyCommand {
                    job: run.spec.name.clone(),
                })?;
                let mut c = AsyncCommand::new(program);
                c.args(args);
                c
            }
        };

        cmd.current_dir(&run.working_dir)
            .env(OUTPUT_DIR_ENV, &run.output_dir)
            .env(NOW_ENV, self.now.timestamp().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);

        // Own process group, so a timeout kill also reaches grandchildren.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd.spawn().map_err(|source| {
            // The job's own log is where its owner will look first.
            let _ = writeln!(stderr_log, "reportor: failed to start {command}: {source}");
            RunnerError::Spawn {
                job: run.spec.name.clone(),
                source,
            }
        })
    }
}

/// One executing or completed instance of a [`JobSpec`].
#[derive(Debug)]
pub struct JobRun {
    spec: JobSpec,
    output_dir: PathBuf,
    working_dir: PathBuf,
    started_at: DateTime<Utc>,
    started: Instant,
    finished_at: Option<DateTime<Utc>>,
    child: Option<Child>,
    exit_status: Option<ExitStatus>,
    kill_reason: Option<KillReason>,
    outcome: Option<JobOutcome>,
    copy_stats: Option<CopyStats>,
}

impl JobRun {
    fn created(spec: JobSpec, output_dir: PathBuf, working_dir: PathBuf) -> Self {
        Self {
            spec,
            output_dir,
            working_dir,
            started_at: Utc::now(),
            started: Instant::now(),
            finished_at: None,
            child: None,
            exit_status: None,
            kill_reason: None,
            outcome: None,
            copy_stats: None,
        }
    }

    /// Finish without a process: end time equals start time.
    fn finish_now(&mut self, outcome: JobOutcome) {
        self.finished_at = Some(self.started_at);
        self.outcome = Some(outcome);
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    pub fn stdout_path(&self) -> PathBuf {
        self.output_dir.join(&self.spec.stdout_path)
    }

    pub fn stderr_path(&self) -> PathBuf {
        self.output_dir.join(&self.spec.stderr_path)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn outcome(&self) -> Option<&JobOutcome> {
        self.outcome.as_ref()
    }

    pub fn copy_stats(&self) -> Option<CopyStats> {
        self.copy_stats
    }

    /// True once a process was actually launched.
    pub fn has_process(&self) -> bool {
        self.child.is_some()
    }

    pub fn kill_requested(&self) -> bool {
        self.kill_reason.is_some()
    }

    /// Wall-clock time since start.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// True when the run has outlived its `max_time_seconds` budget.
    pub fn is_overdue(&self) -> bool {
        self.elapsed() > self.spec.max_time()
    }

    /// Non-blocking liveness check.
    pub fn poll(&mut self) -> Liveness {
        if self.exit_status.is_some() {
            return Liveness::Exited;
        }
        let Some(child) = self.child.as_mut() else {
            return Liveness::Exited;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                Liveness::Exited
            }
            Ok(None) => Liveness::Running,
            Err(e) => {
                // `wait` will surface the failure as the outcome.
                warn!(job = %self.spec.name, "liveness check failed: {e}");
                Liveness::Exited
            }
        }
    }

    /// Wait for the process to exit, record the end time and outcome, then
    /// collect `copy_files`. The blocking step is skipped when no process
    /// was launched; collection still happens, once per run.
    pub async fn wait(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if self.finished_at.is_none() {
                let status = match self.exit_status {
                    Some(status) => Ok(status),
                    None => child.wait().await,
                };
                self.finished_at = Some(Utc::now());

                let outcome = match status {
                    Ok(status) => {
                        self.exit_status = Some(status);
                        outcome_for(status, self.kill_reason)
                    }
                    Err(e) => JobOutcome::WaitFailed {
                        error: e.to_string(),
                    },
                };
                self.outcome = Some(outcome);
            }
        }

        if self.copy_stats.is_none() {
            self.copy_stats = Some(collect_files(
                &self.spec,
                &self.working_dir,
                &self.output_dir,
            ));
        }
    }

    /// Send a forced termination signal for exceeding the time budget.
    /// Does not wait for the exit.
    pub fn kill(&mut self) {
        self.send_kill(KillReason::Timeout);
    }

    /// Like [`JobRun::kill`], for a run cancelled by scheduler shutdown.
    pub fn interrupt(&mut self) {
        self.send_kill(KillReason::Interrupt);
    }

    fn send_kill(&mut self, reason: KillReason) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        if self.exit_status.is_some() {
            return;
        }
        match kill_process_tree(child) {
            Ok(()) => {
                self.kill_reason = Some(reason);
                info!(job = %self.spec.name, ?reason, "kill signal sent");
            }
            Err(e) => debug!(job = %self.spec.name, "kill failed (already exited?): {e}"),
        }
    }
}

#[cfg(unix)]
fn kill_process_tree(child: &mut Child) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    // Safety: `pid` is our direct child and leads its own process group
    // (spawned with `process_group(0)`); it has not been reaped yet.
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
    if rc == 0 {
        Ok(())
    } else {
        child.start_kill()
    }
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KillReason {
    Timeout,
    Interrupt,
}

fn outcome_for(status: ExitStatus, kill_reason: Option<KillReason>) -> JobOutcome {
    if let Some(code) = status.code() {
        // A job may finish on its own in the same tick the kill was sent.
        return JobOutcome::Exited { code };
    }
    match kill_reason {
        Some(KillReason::Timeout) => JobOutcome::TimedOut,
        Some(KillReason::Interrupt) => JobOutcome::Interrupted,
        None => JobOutcome::Signaled {
            signal: exit_signal(status),
        },
    }
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}
