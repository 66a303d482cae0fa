use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

// Process-boundary constants: every child sees these two variables.
pub const OUTPUT_DIR_ENV: &str = "OUTPUT_DIR";
pub const NOW_ENV: &str = "REPORTOR_NOW";

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;
pub const DEFAULT_MAX_TIME_SECS: u64 = 3600;
pub const DEFAULT_STDOUT_PATH: &str = "output.txt";
pub const DEFAULT_STDERR_PATH: &str = "logs/output.log";
pub const DEFAULT_SHELL: &str = "sh";

/// Top-level config (reportor.toml + REPORTOR_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportorConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// What happens to the dependents of a job whose command could not be launched.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LaunchFailurePolicy {
    /// The failed job counts as finished; dependents run as usual.
    #[default]
    Unblock,
    /// Dependents (transitively) are recorded as skipped and never run.
    SkipDependents,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Poll interval between admission and reap passes.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub launch_failure: LaunchFailurePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            launch_failure: LaunchFailurePolicy::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> std::time::Duration {
        // A zero interval would turn the poll loop into a busy spin.
        std::time::Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Shell used for string commands (`<shell> -c <command>`).
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Directory relative `working_dir`s are resolved against.
    /// Defaults to the process working directory.
    #[serde(default)]
    pub jobs_root: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            jobs_root: None,
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

fn default_shell() -> String {
    DEFAULT_SHELL.to_string()
}

impl ReportorConfig {
    /// Load from `config_path` (or `~/.reportor/reportor.toml`) layered under
    /// `REPORTOR_*` environment variables. Nested keys use `__` as separator,
    /// e.g. `REPORTOR_SCHEDULER__TICK_INTERVAL_MS=250`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        debug!(%path, "loading config");

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::ReportorError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("REPORTOR_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.reportor/reportor.toml", home)
}
