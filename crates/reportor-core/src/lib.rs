//! `reportor-core`: configuration, errors and process-boundary constants
//! shared by every reportor crate.

pub mod config;
pub mod error;

pub use config::{LaunchFailurePolicy, ReportorConfig, RunnerConfig, SchedulerConfig};
pub use error::{ReportorError, Result};
