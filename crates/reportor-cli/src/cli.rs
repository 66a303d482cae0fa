//! Command-line surface of the `reportor` binary and the small helpers the
//! driver needs around a scheduling pass.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{
    format::{Item, StrftimeItems},
    DateTime, TimeZone, Utc,
};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "reportor", version, about = "Run the jobs of a manifest for the given schedule tags")]
pub struct Cli {
    /// Log at debug level.
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Log warnings and errors only.
    #[arg(short, long)]
    pub quiet: bool,

    /// Output directory; strftime escapes are expanded with the run time,
    /// e.g. `/var/reports/%Y-%m-%d/%H`.
    #[arg(short, long)]
    pub output_dir: String,

    /// Job manifest (YAML).
    #[arg(short, long)]
    pub manifest: PathBuf,

    /// Run time as epoch seconds (UTC); defaults to now.
    #[arg(short, long)]
    pub date: Option<i64>,

    /// Log file, relative to the output directory.
    #[arg(short, long)]
    pub logfile: Option<PathBuf>,

    /// Symlink to point at the output directory after the run.
    #[arg(short, long)]
    pub symlink: Option<PathBuf>,

    /// Config file (default: $REPORTOR_CONFIG or ~/.reportor/reportor.toml).
    #[arg(long)]
    pub config: Option<String>,

    /// Write the run report as JSON to this file.
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// Schedule tags to run (e.g. hourly daily).
    #[arg(required = true)]
    pub tags: Vec<String>,
}

impl Cli {
    /// Default tracing filter directive for the chosen verbosity.
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    /// The logical "now" of this run.
    pub fn now(&self) -> anyhow::Result<DateTime<Utc>> {
        match self.date {
            Some(epoch) => Utc
                .timestamp_opt(epoch, 0)
                .single()
                .with_context(|| format!("--date {epoch} is out of range")),
            None => Ok(Utc::now()),
        }
    }
}

/// Expand strftime escapes in `pattern` with `now`.
pub fn resolve_output_dir(pattern: &str, now: DateTime<Utc>) -> anyhow::Result<PathBuf> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        bail!("invalid strftime escape in output directory {pattern:?}");
    }
    let mut expanded = String::new();
    write!(expanded, "{}", now.format(pattern))
        .with_context(|| format!("cannot format output directory {pattern:?}"))?;
    Ok(PathBuf::from(expanded))
}

/// Point `link` at `target` (made absolute), replacing whatever symlink was
/// there. The new link is created beside the old one and renamed over it.
#[cfg(unix)]
pub fn update_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    let target = std::path::absolute(target)?;
    let file_name = link
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "reportor".to_string());
    let tmp = link.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));

    let _ = std::fs::remove_file(&tmp);
    std::os::unix::fs::symlink(&target, &tmp)?;
    std::fs::rename(&tmp, link).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })
}

#[cfg(not(unix))]
pub fn update_symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlinks are only supported on unix",
    ))
}
