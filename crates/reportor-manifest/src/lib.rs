//! `reportor-manifest`: typed job manifest loading.
//!
//! A manifest is a YAML mapping of job name to job definition:
//!
//! ```yaml
//! report1:
//!   schedule_tag: hourly
//!   command: [python, report1.py]
//!   max_time_seconds: 10
//!
//! report2:
//!   schedule_tag: hourly
//!   command: python report2.py
//!   requires: [report1]
//!   locks: [statusdb]
//!   working_dir: report2
//!   copy_files:
//!     - "out/*.txt"
//!     - ["flot/*", "static"]
//! ```
//!
//! [`Manifest::parse`] validates every entry and keeps only the jobs whose
//! `schedule_tag` was requested for this run.

pub mod error;
pub mod loader;
pub mod types;

pub use error::{ManifestError, Result};
pub use loader::Manifest;
pub use types::{Command, CopyRule, JobSpec};
