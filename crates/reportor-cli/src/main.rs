use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use reportor_core::config::ReportorConfig;
use reportor_manifest::Manifest;
use reportor_runner::JobRunner;
use reportor_scheduler::{RunReport, Scheduler, SchedulerError};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("reportor: {e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    // Produced files should be readable by everyone.
    // Safety: umask only swaps the process file-mode mask; no pointers involved.
    #[cfg(unix)]
    unsafe {
        libc::umask(0o022);
    }

    let now = cli.now()?;
    let output_dir = cli::resolve_output_dir(&cli.output_dir, now)?;
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("cannot create output directory {}", output_dir.display()))?;

    init_logging(cli.log_level(), cli.logfile.as_deref().map(|f| output_dir.join(f)).as_deref())?;

    // load config: --config > REPORTOR_CONFIG env > ~/.reportor/reportor.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("REPORTOR_CONFIG").ok());
    let config = ReportorConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        ReportorConfig::default()
    });

    let manifest = Manifest::load(&cli.manifest, &cli.tags)
        .with_context(|| format!("cannot load manifest {}", cli.manifest.display()))?;
    debug!(jobs = ?manifest.names().collect::<Vec<_>>(), "manifest loaded");

    let runner = JobRunner::new(&output_dir, now, config.runner.clone())?;
    let scheduler = Scheduler::new(runner, config.scheduler.clone());

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received");
            let _ = shutdown_tx.send(true);
        }
    });

    let outcome = scheduler.run_until(manifest, shutdown_rx).await;

    if let Some(link) = &cli.symlink {
        debug!("{} -> {}", output_dir.display(), link.display());
        if let Err(e) = cli::update_symlink(&output_dir, link) {
            error!(link = %link.display(), "couldn't update symlink: {e}");
        }
    }

    match outcome {
        Ok(report) => {
            write_summary(cli.summary.as_deref(), &report)?;
            for record in report.failures() {
                warn!(job = %record.name, outcome = %record.outcome, "job failed");
            }
            Ok(if report.has_failures() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Err(SchedulerError::Deadlock { blocked, report }) => {
            write_summary(cli.summary.as_deref(), &report)?;
            let names: Vec<&str> = blocked.iter().map(|b| b.name.as_str()).collect();
            anyhow::bail!("unresolvable dependency or lock cycle; never started: {names:?}")
        }
        Err(e) => Err(e.into()),
    }
}

fn init_logging(level: &str, logfile: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match logfile {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    info!("logging initialised");
    Ok(())
}

fn write_summary(path: Option<&Path>, report: &RunReport) -> anyhow::Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = std::fs::File::create(path)
        .with_context(|| format!("cannot create summary {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)?;
    info!(path = %path.display(), "run summary written");
    Ok(())
}
