//! reportor-runner: process lifecycle for individual jobs.
//!
//! [`JobRunner::start`] materialises a job's output directory, output files
//! and environment and launches its command; the returned [`JobRun`] is then
//! polled, waited on, or killed by the scheduler. After exit, `copy_files`
//! rules are applied by [`collect::collect_files`].

pub mod collect;
pub mod error;
pub mod glob;
pub mod runner;
pub mod types;

pub use collect::CopyStats;
pub use error::{Result, RunnerError};
pub use runner::{JobRun, JobRunner};
pub use types::{JobOutcome, Liveness};
