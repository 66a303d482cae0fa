use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use reportor_core::config::{DEFAULT_MAX_TIME_SECS, DEFAULT_STDERR_PATH, DEFAULT_STDOUT_PATH};
use serde::{Deserialize, Serialize};

/// How a job's process is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    /// Passed to the shell as `<shell> -c <string>`.
    Shell(String),
    /// Executed directly; the first element is the program.
    Argv(Vec<String>),
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Shell(s) => write!(f, "{s}"),
            Command::Argv(args) => write!(f, "{}", args.join(" ")),
        }
    }
}

/// One `copy_files` entry: a glob relative to the working directory, with an
/// optional destination directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CopyRule {
    /// Copy matches into the job's output directory.
    Pattern(String),
    /// Copy matches into the given directory. Relative destinations are
    /// resolved against the job's output directory.
    To(String, String),
}

impl CopyRule {
    pub fn pattern(&self) -> &str {
        match self {
            CopyRule::Pattern(p) | CopyRule::To(p, _) => p,
        }
    }

    pub fn destination(&self) -> Option<&str> {
        match self {
            CopyRule::Pattern(_) => None,
            CopyRule::To(_, dst) => Some(dst),
        }
    }
}

/// A validated job definition with all defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: String,
    pub schedule_tag: String,
    /// `None` makes the job a synchronisation node that finishes instantly.
    pub command: Option<Command>,
    pub working_dir: PathBuf,
    pub requires: BTreeSet<String>,
    pub locks: BTreeSet<String>,
    pub max_time_seconds: u64,
    /// Relative to the job's output directory.
    pub stdout_path: PathBuf,
    /// Relative to the job's output directory.
    pub stderr_path: PathBuf,
    pub copy_files: Vec<CopyRule>,
}

impl JobSpec {
    /// Minimal job with every optional field at its default.
    pub fn new(name: impl Into<String>, schedule_tag: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            working_dir: PathBuf::from(&name),
            name,
            schedule_tag: schedule_tag.into(),
            command: None,
            requires: BTreeSet::new(),
            locks: BTreeSet::new(),
            max_time_seconds: DEFAULT_MAX_TIME_SECS,
            stdout_path: PathBuf::from(DEFAULT_STDOUT_PATH),
            stderr_path: PathBuf::from(DEFAULT_STDERR_PATH),
            copy_files: Vec::new(),
        }
    }

    pub fn max_time(&self) -> Duration {
        Duration::from_secs(self.max_time_seconds)
    }
}

/// Wire shape of one manifest entry. Legacy field names are accepted as aliases.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawJob {
    #[serde(alias = "when")]
    schedule_tag: String,
    #[serde(default)]
    command: Option<Command>,
    #[serde(default, alias = "cwd")]
    working_dir: Option<PathBuf>,
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    locks: Vec<String>,
    #[serde(default, alias = "maxtime")]
    max_time_seconds: Option<u64>,
    #[serde(default, alias = "stdout")]
    stdout_path: Option<PathBuf>,
    #[serde(default, alias = "stderr")]
    stderr_path: Option<PathBuf>,
    #[serde(default)]
    copy_files: Vec<CopyRule>,
}

impl RawJob {
    /// Apply defaults and validate. The error string names the offending field.
    pub(crate) fn into_spec(self, name: &str) -> Result<JobSpec, String> {
        validate_name(name)?;

        if self.schedule_tag.trim().is_empty() {
            return Err("schedule_tag must not be empty".to_string());
        }

        match &self.command {
            Some(Command::Argv(args)) if args.is_empty() => {
                return Err("command list must not be empty".to_string());
            }
            Some(Command::Shell(s)) if s.trim().is_empty() => {
                return Err("command string must not be empty".to_string());
            }
            _ => {}
        }

        let max_time_seconds = self.max_time_seconds.unwrap_or(DEFAULT_MAX_TIME_SECS);
        if max_time_seconds == 0 {
            return Err("max_time_seconds must be greater than zero".to_string());
        }

        let stdout_path = self
            .stdout_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STDOUT_PATH));
        let stderr_path = self
            .stderr_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STDERR_PATH));
        validate_output_path("stdout_path", &stdout_path)?;
        validate_output_path("stderr_path", &stderr_path)?;

        if let Some(rule) = self.copy_files.iter().find(|r| r.pattern().is_empty()) {
            return Err(format!("copy_files entry {rule:?} has an empty pattern"));
        }

        if self.requires.iter().any(|r| r == name) {
            return Err("job cannot require itself".to_string());
        }

        Ok(JobSpec {
            name: name.to_string(),
            schedule_tag: self.schedule_tag,
            command: self.command,
            working_dir: self.working_dir.unwrap_or_else(|| PathBuf::from(name)),
            requires: self.requires.into_iter().collect(),
            locks: self.locks.into_iter().collect(),
            max_time_seconds,
            stdout_path,
            stderr_path,
            copy_files: self.copy_files,
        })
    }
}

/// Job names double as output directory names, so they must be a single
/// normal path component.
fn validate_name(name: &str) -> Result<(), String> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains('/') => Ok(()),
        _ => Err("job name must be a single non-empty path component".to_string()),
    }
}

fn validate_output_path(field: &str, path: &Path) -> Result<(), String> {
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if path.as_os_str().is_empty() || escapes {
        return Err(format!(
            "{field} must be a relative path inside the output directory, got {}",
            path.display()
        ));
    }
    Ok(())
}
